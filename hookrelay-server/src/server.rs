//! Listeners and the serving loop.

use crate::error::{Result, ServerError};
use crate::handlers::{admin, connect, public};
use crate::http::{HttpRequest, HttpResponse};
use crate::routing::Router;
use crate::tls::TlsConfig;
use bytes::Bytes;
use hookrelay_config::{DEFAULT_MAX_BODY_BYTES, ServerSettings};
use hookrelay_core::{HookUrlBase, Registry, paths};
use http::header::{HOST, HeaderValue, LOCATION};
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{Level, debug, error, info, warn};

/// Bound sockets for the admin and external listeners.
#[derive(Debug)]
pub struct Listeners {
    admin: TcpListener,
    external: TcpListener,
    secure: Option<TcpListener>,
}

impl Listeners {
    /// Bind the admin listener on loopback and the external listener(s) on
    /// `host`. The TLS listener is bound only when TLS is configured.
    pub async fn bind(settings: &ServerSettings) -> Result<Self> {
        let admin = bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), settings.internal_port)).await?;
        let external = bind_host(&settings.host, settings.external_port).await?;
        let secure = if settings.tls_configured() {
            Some(bind_host(&settings.host, settings.external_ssl_port).await?)
        } else {
            None
        };

        Ok(Self {
            admin,
            external,
            secure,
        })
    }

    pub fn admin_addr(&self) -> Result<SocketAddr> {
        Ok(self.admin.local_addr()?)
    }

    pub fn external_addr(&self) -> Result<SocketAddr> {
        Ok(self.external.local_addr()?)
    }

    pub fn secure_addr(&self) -> Result<Option<SocketAddr>> {
        self.secure
            .as_ref()
            .map(|l| l.local_addr())
            .transpose()
            .map_err(ServerError::from)
    }

    /// Base for hook URLs: the advertised host with the public port (TLS
    /// port when TLS is on). A configured port of 0 is replaced by the port
    /// actually bound.
    pub fn hook_url_base(&self, settings: &ServerSettings) -> Result<HookUrlBase> {
        let (scheme, configured) = settings.public_scheme_and_port();
        let port = match (configured, self.secure_addr()?) {
            (0, Some(addr)) => addr.port(),
            (0, None) => self.external_addr()?.port(),
            (port, _) => port,
        };
        Ok(HookUrlBase::new(scheme, settings.advertised_host(), port))
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn bind_host(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// What a listener serves.
#[derive(Clone)]
enum Surface {
    Admin(Arc<Router>),
    Public(Arc<Router>),
    /// Plaintext external port while TLS is on
    RedirectToTls { port: u16 },
}

impl Surface {
    fn name(&self) -> &'static str {
        match self {
            Surface::Admin(_) => "admin",
            Surface::Public(_) => "public",
            Surface::RedirectToTls { .. } => "redirect",
        }
    }
}

/// State every connection handler needs.
struct Shared {
    registry: Arc<Registry>,
    body_limit: usize,
}

/// The relay server: admin API, public API and connector upgrades over one
/// shared registry.
pub struct RelayServer {
    registry: Arc<Registry>,
    tls: Option<TlsConfig>,
    body_limit: usize,
}

impl RelayServer {
    pub fn new(registry: Arc<Registry>, tls: Option<TlsConfig>) -> Self {
        Self {
            registry,
            tls,
            body_limit: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Cap request bodies on every listener; larger ones get 413.
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Serve until `shutdown` resolves, then close every relay connection.
    pub async fn serve(self, listeners: Listeners, shutdown: impl Future<Output = ()>) -> Result<()> {
        let admin = Surface::Admin(Arc::new(admin::router(self.registry.clone())));
        let public = Surface::Public(Arc::new(public::router(self.registry.clone())));
        let shared = Arc::new(Shared {
            registry: self.registry.clone(),
            body_limit: self.body_limit,
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        info!(addr = %listeners.admin_addr()?, "Admin API listening");
        tasks.spawn(accept_loop(listeners.admin, None, admin, shared.clone(), stop_rx.clone()));

        match (listeners.secure, &self.tls) {
            (Some(secure), Some(tls)) => {
                let port = secure.local_addr()?.port();
                info!(addr = %secure.local_addr()?, "Public API listening (TLS)");
                info!(addr = %listeners.external.local_addr()?, "Redirecting plaintext to TLS");
                tasks.spawn(accept_loop(
                    secure,
                    Some(tls.acceptor()),
                    public,
                    shared.clone(),
                    stop_rx.clone(),
                ));
                tasks.spawn(accept_loop(
                    listeners.external,
                    None,
                    Surface::RedirectToTls { port },
                    shared.clone(),
                    stop_rx.clone(),
                ));
            }
            (None, None) => {
                info!(addr = %listeners.external.local_addr()?, "Public API listening");
                tasks.spawn(accept_loop(listeners.external, None, public, shared.clone(), stop_rx.clone()));
            }
            _ => {
                return Err(ServerError::Tls(
                    "TLS listener and certificate must be configured together".to_string(),
                ));
            }
        }

        shutdown.await;
        info!("Shutting down");
        let _ = stop_tx.send(true);
        while tasks.join_next().await.is_some() {}

        let closed = self.registry.close_all();
        info!(connections = closed, "Closed relay connections");
        Ok(())
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop || rx.changed().await.is_err() {
            return;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    surface: Surface,
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = stop_requested(&mut stop) => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(surface = surface.name(), error = %e, "Accept failed");
                    continue;
                }
            },
        };

        let surface = surface.clone();
        let shared = shared.clone();
        match &tls {
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, peer, surface, shared).await,
                        Err(e) => debug!(remote = %peer, error = %e, "TLS handshake failed"),
                    }
                });
            }
            None => {
                tokio::spawn(serve_connection(stream, peer, surface, shared));
            }
        }
    }
}

async fn serve_connection<I>(io: I, peer: SocketAddr, surface: Surface, shared: Arc<Shared>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let surface = surface.clone();
        let shared = shared.clone();
        async move {
            Ok::<_, Infallible>(dispatch(surface, shared, request, peer).await)
        }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .with_upgrades()
        .await
    {
        debug!(remote = %peer, error = %e, "Error serving connection");
    }
}

async fn dispatch(
    surface: Surface,
    shared: Arc<Shared>,
    request: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> hyper::Response<Full<Bytes>> {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = match &surface {
        Surface::RedirectToTls { port } => redirect_to_tls(&request, *port),
        Surface::Public(_) if path == paths::CONNECT => {
            connect::upgrade(request, shared.registry.clone(), Some(peer))
        }
        Surface::Admin(router) | Surface::Public(router) => {
            match HttpRequest::from_hyper(request, Some(peer), shared.body_limit).await {
                Ok(request) => router
                    .route(request)
                    .await
                    .unwrap_or_else(|e| e.into_response()),
                Err(e) => {
                    debug!(remote = %peer, error = %e, "Request body rejected");
                    e.into_response()
                }
            }
        }
    };

    log_access(
        surface.name(),
        peer,
        &method,
        &path,
        response.status,
        started.elapsed().as_millis() as u64,
    );

    response.into_hyper()
}

/// 5xx at error, 4xx at warn, everything else at info.
fn access_level(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

fn log_access(
    surface: &str,
    peer: SocketAddr,
    method: &http::Method,
    path: &str,
    status: StatusCode,
    latency_ms: u64,
) {
    let level = access_level(status);
    let status = status.as_u16();
    if level == Level::ERROR {
        error!(surface, remote = %peer, %method, path, status, latency_ms, "request");
    } else if level == Level::WARN {
        warn!(surface, remote = %peer, %method, path, status, latency_ms, "request");
    } else {
        info!(surface, remote = %peer, %method, path, status, latency_ms, "request");
    }
}

/// `307` to the same host and path on the TLS port.
fn redirect_to_tls(request: &hyper::Request<Incoming>, port: u16) -> HttpResponse {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .map(strip_port)
        .unwrap_or("localhost");
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");

    let location = format!("https://{}:{}{}", host, port, path);
    match HeaderValue::from_str(&location) {
        Ok(value) => HttpResponse::new(StatusCode::TEMPORARY_REDIRECT).with_header(LOCATION, value),
        Err(_) => HttpResponse::new(StatusCode::BAD_REQUEST),
    }
}

/// Host header without its port; IPv6 literals keep their brackets.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_follows_status() {
        assert_eq!(access_level(StatusCode::OK), Level::INFO);
        assert_eq!(access_level(StatusCode::SWITCHING_PROTOCOLS), Level::INFO);
        assert_eq!(access_level(StatusCode::TEMPORARY_REDIRECT), Level::INFO);
        assert_eq!(access_level(StatusCode::FORBIDDEN), Level::WARN);
        assert_eq!(access_level(StatusCode::PAYLOAD_TOO_LARGE), Level::WARN);
        assert_eq!(access_level(StatusCode::BAD_GATEWAY), Level::ERROR);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_failed_requests_logged_at_warn_threshold() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_max_level(Level::WARN)
            .finish();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        tracing::subscriber::with_default(subscriber, || {
            log_access("public", peer, &http::Method::POST, "/h/ok", StatusCode::OK, 1);
            log_access("public", peer, &http::Method::POST, "/h/missing", StatusCode::BAD_GATEWAY, 2);
            log_access("public", peer, &http::Method::GET, "/v1/hooks", StatusCode::FORBIDDEN, 3);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2, "{output}");
        assert!(lines[0].contains("ERROR") && lines[0].contains("status=502"));
        assert!(lines[0].contains("latency_ms=2"));
        assert!(lines[1].contains("WARN") && lines[1].contains("status=403"));
        assert!(!output.contains("/h/ok"));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("relay.example.com:12840"), "relay.example.com");
        assert_eq!(strip_port("relay.example.com"), "relay.example.com");
        assert_eq!(strip_port("[::1]:12840"), "[::1]");
    }
}
