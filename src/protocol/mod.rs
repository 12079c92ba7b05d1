//! Client/Server Protocol
//!
//! - **command**: Text commands clients send to manage subscriptions
//! - **message**: Binary messages the server sends to clients
//! - **error**: Encoding and decoding failures
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:9002/');
//! ws.binaryType = 'arraybuffer';
//!
//! ws.onopen = () => ws.send('SUBSCRIBE depth');
//! ws.onmessage = (event) => decodeMessage(new Uint8Array(event.data));
//! ```

pub mod command;
pub mod error;
pub mod message;

pub use command::{Action, Command};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{now_millis, Message, MessageType, Payload, MAGIC, PROTOCOL_VERSION};
