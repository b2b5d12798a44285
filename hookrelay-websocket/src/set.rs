//! Per-client sets of live relay connections.

use crate::connection::{Connection, ConnectionId, ConnectionState, ConnectionWriter, wait_closed};
use crate::error::{WebSocketError, WebSocketResult};
use crate::message::{Inbound, Message};
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

/// Transport tuning shared by every connection of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Upper bound for queueing or writing one frame to one connection
    pub send_timeout: Duration,
    /// Outgoing frames buffered per connection
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

#[derive(Default)]
struct SetInner {
    closed: bool,
    conns: HashMap<ConnectionId, Connection>,
}

/// The live connections of one client.
///
/// Once [`ConnectionSet::close_all`] has run the set stays closed and
/// refuses new registrations.
pub struct ConnectionSet {
    inner: RwLock<SetInner>,
    config: RelayConfig,
}

impl ConnectionSet {
    /// Create an empty set.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: RwLock::new(SetInner::default()),
            config,
        }
    }

    /// Transport settings of this set.
    pub fn config(&self) -> RelayConfig {
        self.config
    }

    /// Add a connection. Fails once the set is closed.
    pub fn register(&self, connection: Connection) -> WebSocketResult<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(WebSocketError::SetClosed);
        }
        inner.conns.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection, returning it if it was present.
    pub fn unregister(&self, connection_id: &str) -> Option<Connection> {
        self.inner.write().conns.remove(connection_id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.inner.read().conns.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.inner.read().conns.is_empty()
    }

    /// Whether [`ConnectionSet::close_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Ids of the live connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.read().conns.keys().cloned().collect()
    }

    /// Send `payload` as a binary frame to every live connection.
    ///
    /// Sends run concurrently, each bounded by the send timeout. A failed
    /// send is logged and skipped. Returns the number of connections the
    /// frame was queued on.
    pub async fn broadcast(&self, payload: Bytes) -> usize {
        let targets: Vec<Connection> = self.inner.read().conns.values().cloned().collect();
        if targets.is_empty() {
            return 0;
        }

        let timeout = self.config.send_timeout;
        let sends = targets.iter().map(|conn| {
            let message = Message::request(payload.clone());
            async move { (conn, conn.send(message, timeout).await) }
        });

        let mut delivered = 0;
        for (conn, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %conn.id,
                        error = %e,
                        "Relay send failed, skipping connection"
                    );
                }
            }
        }
        delivered
    }

    /// Close every connection and refuse new ones.
    ///
    /// Returns how many connections were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Connection> = {
            let mut inner = self.inner.write();
            inner.closed = true;
            inner.conns.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }
        drained.len()
    }

    /// Run an accepted websocket as a member of this set.
    ///
    /// Registers the connection, forwards broadcast frames to it and reads
    /// until the peer closes, the socket fails or the connection is closed
    /// locally. Application frames from the peer are ignored.
    pub async fn serve<S>(
        &self,
        stream: WebSocketStream<S>,
        remote_addr: Option<SocketAddr>,
    ) -> WebSocketResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (connection, rx) =
            Connection::new(connection_id.clone(), remote_addr, self.config.queue_capacity);

        let (write, mut read) = stream.split();
        self.register(connection.clone())?;

        tracing::debug!(connection_id = %connection_id, remote = ?remote_addr, "Relay connection established");

        let writer = ConnectionWriter::new(
            write,
            rx,
            connection.shutdown_signal(),
            self.config.send_timeout,
        );
        let writer_handle = tokio::spawn(writer.run());

        let mut shutdown = connection.shutdown_signal();
        loop {
            tokio::select! {
                _ = wait_closed(&mut shutdown) => break,
                next = read.next() => match next {
                    None => break,
                    Some(Ok(msg)) => match Inbound::from(&msg) {
                        Inbound::Close => break,
                        Inbound::Control => {}
                        Inbound::Data(bytes) => tracing::debug!(
                            connection_id = %connection_id,
                            bytes,
                            "Ignoring frame from connector"
                        ),
                    },
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Relay read failed");
                        break;
                    }
                },
            }
        }

        connection.close();
        let _ = writer_handle.await;
        connection.set_state(ConnectionState::Closed);
        self.unregister(&connection_id);

        tracing::debug!(connection_id = %connection_id, "Relay connection closed");
        Ok(())
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl std::fmt::Debug for ConnectionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConnectionSet")
            .field("connections", &inner.conns.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RelayConfig {
        RelayConfig {
            send_timeout: Duration::from_millis(20),
            queue_capacity: 1,
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_set() {
        let set = ConnectionSet::default();
        assert_eq!(set.broadcast(Bytes::from_static(b"x")).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_skips_failed_connections() {
        let set = ConnectionSet::new(fast());
        let (healthy, mut healthy_rx) = Connection::new("healthy".into(), None, 1);
        let (gone, gone_rx) = Connection::new("gone".into(), None, 1);
        let (stuck, _stuck_rx) = Connection::new("stuck".into(), None, 1);
        drop(gone_rx);
        stuck
            .send(Message::request(&b"fill"[..]), Duration::from_millis(5))
            .await
            .unwrap();

        set.register(healthy).unwrap();
        set.register(gone).unwrap();
        set.register(stuck).unwrap();

        assert_eq!(set.broadcast(Bytes::from_static(b"payload")).await, 1);
        let received = healthy_rx.recv().await.unwrap();
        assert_eq!(received.as_bytes(), b"payload");
    }

    #[tokio::test]
    async fn test_close_all_refuses_new_connections() {
        let set = ConnectionSet::default();
        let (a, _rx_a) = Connection::new("a".into(), None, 1);
        let (b, _rx_b) = Connection::new("b".into(), None, 1);
        set.register(a.clone()).unwrap();
        set.register(b).unwrap();

        assert_eq!(set.close_all(), 2);
        assert!(set.is_empty());
        assert!(set.is_closed());
        assert!(!a.is_open());

        let (late, _rx) = Connection::new("late".into(), None, 1);
        assert!(matches!(set.register(late), Err(WebSocketError::SetClosed)));
    }

    #[test]
    fn test_unregister() {
        let set = ConnectionSet::default();
        let (a, _rx) = Connection::new("a".into(), None, 1);
        set.register(a).unwrap();
        assert_eq!(set.connection_ids(), vec!["a".to_string()]);
        assert!(set.unregister("a").is_some());
        assert!(set.unregister("a").is_none());
        assert_eq!(set.len(), 0);
    }
}
