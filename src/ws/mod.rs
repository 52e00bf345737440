//! Client transport - wire protocol, sessions and the upgrade endpoint

pub mod handler;
pub mod protocol;
pub mod session;

pub use handler::ws_handler;
