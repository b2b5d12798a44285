//! Frames carried on a relay connection.

use bytes::Bytes;
use tungstenite::protocol::WebSocketConfig;

/// Largest frame or message a relay connection reads: 16 MiB.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read limits for relay sockets. Both peers use the same values so a frame
/// the relay may send is always one the connector accepts.
pub fn frame_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_frame_size(Some(MAX_FRAME_SIZE))
        .max_message_size(Some(MAX_FRAME_SIZE))
}

/// Outgoing frame queued for a relay connection: one serialized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    /// Frame carrying an encoded request.
    pub fn request<B: Into<Bytes>>(data: B) -> Self {
        Message(data.into())
    }

    /// Get the payload as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        tungstenite::Message::Binary(msg.0)
    }
}

/// What the relay makes of a frame read from a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Application data; connectors have nothing to say, so it is dropped
    Data(usize),
    /// Ping, pong or raw frame, answered by tungstenite itself
    Control,
    /// Peer started the close handshake
    Close,
}

impl From<&tungstenite::Message> for Inbound {
    fn from(msg: &tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(text) => Inbound::Data(text.len()),
            tungstenite::Message::Binary(data) => Inbound::Data(data.len()),
            tungstenite::Message::Close(_) => Inbound::Close,
            tungstenite::Message::Ping(_)
            | tungstenite::Message::Pong(_)
            | tungstenite::Message::Frame(_) => Inbound::Control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frame_is_binary() {
        let raw: tungstenite::Message = Message::request(&b"POST /h/x HTTP/1.1\r\n\r\n"[..]).into();
        assert!(raw.is_binary());
        assert_eq!(raw.len(), 22);
    }

    #[test]
    fn test_inbound_classification() {
        assert_eq!(
            Inbound::from(&tungstenite::Message::text("hi")),
            Inbound::Data(2)
        );
        assert_eq!(
            Inbound::from(&tungstenite::Message::Ping(Bytes::new())),
            Inbound::Control
        );
        assert_eq!(
            Inbound::from(&tungstenite::Message::Close(None)),
            Inbound::Close
        );
    }

    #[test]
    fn test_frame_config_limits() {
        let config = frame_config();
        assert_eq!(config.max_frame_size, Some(MAX_FRAME_SIZE));
        assert_eq!(config.max_message_size, Some(MAX_FRAME_SIZE));
    }
}
