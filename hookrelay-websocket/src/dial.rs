//! Outbound websocket dialing with bearer authentication.

use crate::error::{WebSocketError, WebSocketResult};
use crate::message::frame_config;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue, LOCATION};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};

/// A dialed relay stream.
pub type DialedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How the server answered the upgrade request.
pub enum DialOutcome {
    /// Upgrade accepted
    Connected(Box<DialedStream>),
    /// 3xx with a `Location` to try next
    Redirect {
        /// Response status
        status: StatusCode,
        /// Raw `Location` header value
        location: String,
    },
    /// Any other non-101 answer
    Rejected {
        /// Response status
        status: StatusCode,
    },
}

impl std::fmt::Debug for DialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialOutcome::Connected(_) => f.write_str("Connected"),
            DialOutcome::Redirect { status, location } => f
                .debug_struct("Redirect")
                .field("status", status)
                .field("location", location)
                .finish(),
            DialOutcome::Rejected { status } => {
                f.debug_struct("Rejected").field("status", status).finish()
            }
        }
    }
}

/// Dial `url` (`ws://` or `wss://`) presenting `Authorization: Bearer <secret>`.
///
/// `tls` is used for `wss://` targets; without it tokio-tungstenite falls
/// back to the bundled webpki roots. Reads are capped by [`frame_config`].
pub async fn dial(
    url: &str,
    secret: &str,
    tls: Option<Arc<rustls::ClientConfig>>,
    timeout: Duration,
) -> WebSocketResult<DialOutcome> {
    let mut request = url
        .into_client_request()
        .map_err(|e| WebSocketError::InvalidUrl(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", secret))
        .map_err(|e| WebSocketError::InvalidHeader(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let connector = tls.map(Connector::Rustls);
    let attempt =
        connect_async_tls_with_config(request, Some(frame_config()), false, connector);

    match tokio::time::timeout(timeout, attempt).await {
        Err(_) => Err(WebSocketError::Timeout),
        Ok(Ok((stream, _response))) => Ok(DialOutcome::Connected(Box::new(stream))),
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if status.is_redirection() => {
                    Ok(DialOutcome::Redirect { status, location })
                }
                _ => Ok(DialOutcome::Rejected { status }),
            }
        }
        Ok(Err(e)) => Err(WebSocketError::Protocol(e)),
    }
}
