//! Domain types and the ports the application layer depends on.

pub mod access_key;
pub mod authorization;
pub mod event;
pub mod ports;
pub mod voucher;
