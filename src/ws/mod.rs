//! WebSocket transport: wire protocol, connection hub, gateway

pub mod gateway;
pub mod handler;
pub mod hub;
pub mod protocol;

pub use gateway::{ChatModeration, Gateway, Session};
pub use hub::Hub;
