//! Application layer: the order lifecycle engine, its typed requests and the
//! command replay used by the binary.

pub mod engine;
pub mod replay;
pub mod requests;
