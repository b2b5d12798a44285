//! The connector: one authenticated relay connection plus hook self-service.

use crate::endpoint::Endpoint;
use crate::error::{ConnectorError, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use hookrelay_core::{Webhook, paths};
use hookrelay_websocket::{DialOutcome, DialedStream, RawMessage, decode_request, dial};
use http::{Request, StatusCode};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection state as seen by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
}

/// Builder for [`Connector`].
#[derive(Debug, Clone)]
pub struct ConnectorBuilder {
    secret: String,
    root_certificates: Vec<Vec<u8>>,
    connect_timeout: Duration,
    request_timeout: Duration,
    max_redirects: usize,
    queue_capacity: usize,
}

impl ConnectorBuilder {
    fn new(secret: String) -> Self {
        Self {
            secret,
            root_certificates: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            max_redirects: 5,
            queue_capacity: 256,
        }
    }

    /// Trust an additional DER-encoded root certificate.
    pub fn add_root_certificate(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(der.into());
        self
    }

    /// Bound on dialing plus the upgrade handshake, per hop.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Timeout for self-service HTTP calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Maximum number of redirects followed while connecting.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Capacity of the decoded request queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<Connector> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.request_timeout)
            .redirect(reqwest::redirect::Policy::none());

        for der in &self.root_certificates {
            roots
                .add(rustls::pki_types::CertificateDer::from(der.clone()))
                .map_err(|e| ConnectorError::Tls(e.to_string()))?;
            http = http.add_root_certificate(reqwest::Certificate::from_der(der)?);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ConnectorError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Connector {
            secret: self.secret,
            tls: Arc::new(tls),
            http: http.build()?,
            connect_timeout: self.connect_timeout,
            max_redirects: self.max_redirects,
            queue_capacity: self.queue_capacity,
            shared: Arc::new(Shared::default()),
            endpoint: RwLock::new(None),
            session: Mutex::new(None),
        })
    }
}

/// Decoded requests relayed by the server, in arrival order.
///
/// Ends once the connection closes.
#[derive(Debug)]
pub struct Requests {
    rx: mpsc::Receiver<Request<Bytes>>,
}

impl Requests {
    /// Wait for the next request. `None` once the connection is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Request<Bytes>> {
        self.rx.recv().await
    }

    /// Take a queued request without waiting.
    pub fn try_recv(&mut self) -> Option<Request<Bytes>> {
        self.rx.try_recv().ok()
    }
}

struct Shared {
    state: RwLock<ConnectorState>,
    dropped: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: RwLock::new(ConnectorState::Disconnected),
            dropped: AtomicU64::new(0),
        }
    }
}

/// Puts the state back to `Disconnected` unless the connect completed,
/// including when the `connect` future is dropped mid-dial.
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.shared.state.write() = ConnectorState::Disconnected;
        }
    }
}

struct Session {
    shutdown: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

/// Receives relayed webhook requests for one client.
///
/// ```rust,no_run
/// use hookrelay_client::Connector;
///
/// # async fn run() -> Result<(), hookrelay_client::ConnectorError> {
/// let connector = Connector::builder("acme:3q2+7w==").build()?;
/// let mut requests = connector.connect("relay.example.com", 12840, false).await?;
///
/// while let Some(request) = requests.recv().await {
///     println!("{} {}", request.method(), request.uri());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Connector {
    secret: String,
    tls: Arc<rustls::ClientConfig>,
    http: reqwest::Client,
    connect_timeout: Duration,
    max_redirects: usize,
    queue_capacity: usize,
    shared: Arc<Shared>,
    endpoint: RwLock<Option<Endpoint>>,
    session: Mutex<Option<Session>>,
}

impl Connector {
    /// Start building a connector authenticating with `secret` (`name:token`).
    pub fn builder(secret: impl Into<String>) -> ConnectorBuilder {
        ConnectorBuilder::new(secret.into())
    }

    pub fn state(&self) -> ConnectorState {
        *self.shared.state.read()
    }

    /// Requests dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// The endpoint the last successful connect ended up on.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint.read().clone()
    }

    /// Open the relay connection.
    ///
    /// A `307` answer re-dials the `Location` host and port over TLS, up to
    /// the redirect cap. Any other refusal is `CouldNotConnect`.
    pub async fn connect(&self, host: &str, port: u16, use_tls: bool) -> Result<Requests> {
        {
            let mut state = self.shared.state.write();
            if *state != ConnectorState::Disconnected {
                return Err(ConnectorError::AlreadyConnected);
            }
            *state = ConnectorState::Connecting;
        }
        let connecting = ConnectingGuard::new(&self.shared);

        self.finish_session().await;

        let (stream, endpoint) = self
            .dial_following_redirects(Endpoint::new(host, port, use_tls))
            .await?;

        info!(endpoint = %endpoint, "Relay connection established");

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        *self.shared.state.write() = ConnectorState::Connected;
        connecting.disarm();
        let reader = tokio::spawn(read_loop(*stream, tx, shutdown_rx, self.shared.clone()));

        *self.endpoint.write() = Some(endpoint);
        *self.session.lock() = Some(Session { shutdown, reader });

        Ok(Requests { rx })
    }

    async fn dial_following_redirects(
        &self,
        mut endpoint: Endpoint,
    ) -> Result<(Box<DialedStream>, Endpoint)> {
        for _ in 0..=self.max_redirects {
            let url = endpoint.connect_url();
            debug!(url = %url, "Dialing relay");

            match dial(&url, &self.secret, Some(self.tls.clone()), self.connect_timeout).await? {
                DialOutcome::Connected(stream) => return Ok((stream, endpoint)),
                DialOutcome::Redirect { status, location } if status == StatusCode::TEMPORARY_REDIRECT => {
                    debug!(location = %location, "Following relay redirect");
                    endpoint = Endpoint::from_location(&location)?;
                }
                DialOutcome::Redirect { status, .. } | DialOutcome::Rejected { status } => {
                    return Err(ConnectorError::CouldNotConnect {
                        status: status.as_u16(),
                    });
                }
            }
        }

        Err(ConnectorError::TooManyRedirects(self.max_redirects))
    }

    /// Close the relay connection and wait for the read loop to stop.
    pub async fn disconnect(&self) {
        self.finish_session().await;
        *self.shared.state.write() = ConnectorState::Disconnected;
    }

    async fn finish_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            let _ = session.shutdown.send(true);
            if let Err(e) = session.reader.await {
                warn!(error = %e, "Relay read loop ended abnormally");
            }
        }
    }

    /// Create a hook for this client.
    pub async fn add_hook(&self, identifier: &str) -> Result<Webhook> {
        let url = self.hooks_url(Some(identifier))?;
        let response = self.http.put(url).bearer_auth(&self.secret).send().await?;

        match response.status() {
            StatusCode::CREATED => Ok(response.json().await?),
            status => Err(ConnectorError::UnknownServerError {
                status: status.as_u16(),
            }),
        }
    }

    /// Delete one of this client's hooks.
    pub async fn remove_hook(&self, identifier: &str) -> Result<()> {
        let url = self.hooks_url(Some(identifier))?;
        let response = self.http.delete(url).bearer_auth(&self.secret).send().await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ConnectorError::UnknownServerError {
                status: status.as_u16(),
            }),
        }
    }

    /// This client's hooks.
    pub async fn list_hooks(&self) -> Result<Vec<Webhook>> {
        let url = self.hooks_url(None)?;
        let response = self.http.get(url).bearer_auth(&self.secret).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => Err(ConnectorError::UnknownServerError {
                status: status.as_u16(),
            }),
        }
    }

    fn hooks_url(&self, identifier: Option<&str>) -> Result<String> {
        let endpoint = self.endpoint.read();
        let endpoint = endpoint.as_ref().ok_or(ConnectorError::NotConnected)?;
        Ok(match identifier {
            Some(id) => endpoint.http_url(&format!("{}/{}", paths::HOOKS, urlencoding::encode(id))),
            None => endpoint.http_url(paths::HOOKS),
        })
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown.send(true);
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("state", &self.state())
            .field("endpoint", &*self.endpoint.read())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested || rx.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop(
    mut stream: DialedStream,
    tx: mpsc::Sender<Request<Bytes>>,
    mut shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                let _ = stream.close(None).await;
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(RawMessage::Binary(data))) => {
                    if !deliver(&data, &tx, &shared) {
                        let _ = stream.close(None).await;
                        break;
                    }
                }
                Some(Ok(RawMessage::Text(text))) => {
                    if !deliver(text.as_bytes(), &tx, &shared) {
                        let _ = stream.close(None).await;
                        break;
                    }
                }
                Some(Ok(RawMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Relay read failed");
                    break;
                }
            }
        }
    }

    *shared.state.write() = ConnectorState::Disconnected;
    info!("Relay connection closed");
}

/// Queue one frame. Returns false once nobody is consuming.
fn deliver(frame: &[u8], tx: &mpsc::Sender<Request<Bytes>>, shared: &Shared) -> bool {
    let request = match decode_request(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable relay frame");
            return true;
        }
    };

    match tx.try_send(request) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(request)) => {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(uri = %request.uri(), "Request queue full, dropping relayed request");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
