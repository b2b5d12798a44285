//! # HookRelay connector
//!
//! Opens an authenticated relay connection to a HookRelay server and yields
//! every webhook request captured for this client as an [`http::Request`].
//! Also manages the client's own hooks over the public API.
//!
//! Requests are queued in a bounded buffer. When the consumer falls behind
//! and the buffer is full, newly arriving requests are dropped and counted
//! (see [`Connector::dropped`]); the connection itself never stalls.

mod connector;
mod endpoint;
mod error;

pub use connector::{Connector, ConnectorBuilder, ConnectorState, Requests};
pub use endpoint::Endpoint;
pub use error::{ConnectorError, Result};
