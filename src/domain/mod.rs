//! Domain layer: order, listing and account entities, the pure transition
//! guard, and the ports the lifecycle engine drives.

pub mod account;
pub mod guard;
pub mod listing;
pub mod notification;
pub mod order;
pub mod ports;
