//! # HookRelay websocket transport
//!
//! Server-side connection sets that fan captured requests out to a client's
//! live connections, the frame codec carrying one HTTP request per binary
//! message, and the authenticated dialer used by connectors.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use hookrelay_websocket::{ConnectionSet, RelayConfig};
//!
//! # async fn run() {
//! let set = ConnectionSet::new(RelayConfig::default());
//! let delivered = set.broadcast(Bytes::from_static(b"POST /h/x HTTP/1.1\r\n\r\n")).await;
//! assert_eq!(delivered, 0);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod connection;
mod dial;
mod error;
mod message;
mod set;
pub mod wire;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use dial::{DialOutcome, DialedStream, dial};
pub use error::{WebSocketError, WebSocketResult};
pub use message::{Inbound, MAX_FRAME_SIZE, Message, frame_config};
pub use set::{ConnectionSet, RelayConfig};
pub use wire::{WireError, decode_request, encode_request};

// Re-export commonly used types from tungstenite
pub use tokio_tungstenite::WebSocketStream;
pub use tungstenite::Message as RawMessage;
pub use tungstenite::handshake::derive_accept_key;
pub use tungstenite::protocol::Role;
