//! WebSocket Broadcast Transport
//!
//! Delivers encoded frames to subscribed clients.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Owns every live connection's outbound queue
//! - **Channel**: One topic and its subscriber set, publishing through the hub
//! - **Handler**: Handles WebSocket upgrade and per-connection tasks
//!
//! ## Usage
//!
//! Clients connect to `/` (or `/ws`) and send plain-text commands:
//! - `SUBSCRIBE video` / `UNSUBSCRIBE video` - Colour frames
//! - `SUBSCRIBE depth` / `UNSUBSCRIBE depth` - Depth frames
//!
//! Everything the server sends back is a binary protocol message; see
//! [`crate::protocol`].

mod channel;
mod handler;
mod hub;

pub use channel::Channel;
pub use handler::websocket_handler;
pub use hub::{
    ConnectionHandle, ConnectionHub, ConnectionId, HubConfig, HubError, Outbound, SendError,
    Transport,
};
