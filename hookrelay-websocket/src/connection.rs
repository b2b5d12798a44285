//! Relay connection handles.

use crate::error::{WebSocketError, WebSocketResult};
use crate::message::Message;
use futures_util::{Sink, SinkExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Unique identifier for a connection.
pub type ConnectionId = String;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is open and ready
    Open,
    /// Close was requested, the writer is shutting down
    Closing,
    /// Connection is closed
    Closed,
}

/// Handle to one live relay connection.
///
/// Clones share state: closing any clone closes the connection.
#[derive(Clone)]
pub struct Connection {
    /// Unique connection identifier
    pub id: ConnectionId,
    /// Remote address
    pub remote_addr: Option<SocketAddr>,
    state: Arc<RwLock<ConnectionState>>,
    tx: mpsc::Sender<Message>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Create a connection with a bounded outgoing queue.
    ///
    /// Returns the handle and the receiving half for its writer.
    pub fn new(
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let connection = Self {
            id,
            remote_addr,
            state: Arc::new(RwLock::new(ConnectionState::Open)),
            tx,
            shutdown: Arc::new(shutdown),
        };
        (connection, rx)
    }

    /// Get the connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a message, waiting at most `timeout` for room in the queue.
    pub async fn send(&self, message: Message, timeout: Duration) -> WebSocketResult<()> {
        if !self.is_open() {
            return Err(WebSocketError::ConnectionClosed);
        }
        match tokio::time::timeout(timeout, self.tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(WebSocketError::ConnectionClosed),
            Err(_) => Err(WebSocketError::Timeout),
        }
    }

    /// Close the connection. Safe to call any number of times.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
            }
        }
        self.shutdown.send_replace(true);
    }

    /// Receiver that flips to `true` once [`Connection::close`] is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn wait_closed(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}

/// Manages the write side of a websocket connection.
pub(crate) struct ConnectionWriter<S> {
    sink: S,
    rx: mpsc::Receiver<Message>,
    shutdown: watch::Receiver<bool>,
    write_timeout: Duration,
}

impl<S> ConnectionWriter<S>
where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    pub fn new(
        sink: S,
        rx: mpsc::Receiver<Message>,
        shutdown: watch::Receiver<bool>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            rx,
            shutdown,
            write_timeout,
        }
    }

    /// Forward queued messages to the socket until closed or a write fails.
    pub async fn run(mut self) -> WebSocketResult<()> {
        let result = loop {
            let message = tokio::select! {
                _ = wait_closed(&mut self.shutdown) => break Ok(()),
                message = self.rx.recv() => match message {
                    Some(message) => message,
                    None => break Ok(()),
                },
            };

            let raw_message: tungstenite::Message = message.into();

            match tokio::time::timeout(self.write_timeout, self.sink.send(raw_message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to write websocket frame");
                    break Err(WebSocketError::Protocol(e));
                }
                Err(_) => {
                    tracing::warn!("Websocket write timed out");
                    break Err(WebSocketError::Timeout);
                }
            }
        };

        // Best effort close frame, bounded like any other write
        let _ = tokio::time::timeout(self.write_timeout, self.sink.close()).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _rx) = Connection::new("c1".into(), None, 4);
        conn.close();
        conn.close();

        assert_eq!(conn.state(), ConnectionState::Closing);
        let result = conn.send(Message::request(&b"x"[..]), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(WebSocketError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_full_queue_times_out() {
        let (conn, _rx) = Connection::new("c1".into(), None, 1);
        conn.send(Message::request(&b"a"[..]), Duration::from_millis(10))
            .await
            .unwrap();

        let result = conn.send(Message::request(&b"b"[..]), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(WebSocketError::Timeout)));
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_cleanly() {
        let (conn, rx) = Connection::new("c1".into(), None, 1);
        drop(rx);

        let result = conn.send(Message::request(&b"a"[..]), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(WebSocketError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_signal_observes_close() {
        let (conn, _rx) = Connection::new("c1".into(), None, 1);
        let mut signal = conn.shutdown_signal();
        let clone = conn.clone();

        clone.close();
        assert!(signal.wait_for(|closed| *closed).await.is_ok());
        assert!(!conn.is_open());
    }
}
