//! CSV adapters for the replay binary.

pub mod command_reader;
pub mod order_writer;
