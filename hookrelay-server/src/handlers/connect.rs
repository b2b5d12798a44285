//! Websocket upgrade for connectors.

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::http::HttpResponse;
use hookrelay_core::Registry;
use hookrelay_websocket::{Role, WebSocketStream, derive_accept_key, frame_config};
use http::header::{CONNECTION, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{HeaderMap, StatusCode};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;

fn header_has_token(headers: &HeaderMap, name: http::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Authenticate, answer 101 and hand the upgraded socket to the client's
/// connection set.
pub fn upgrade(
    mut request: hyper::Request<Incoming>,
    registry: Arc<Registry>,
    peer: Option<SocketAddr>,
) -> HttpResponse {
    let client = match authenticate(&registry, request.headers()) {
        Ok(client) => client,
        Err(e) => return e.into_response(),
    };

    let headers = request.headers();
    let key = headers.get(SEC_WEBSOCKET_KEY).map(|k| k.as_bytes().to_vec());
    let key = match key {
        Some(key)
            if header_has_token(headers, CONNECTION, "upgrade")
                && header_has_token(headers, UPGRADE, "websocket") =>
        {
            key
        }
        _ => return ApiError::bad_request("Expected a websocket upgrade").into_response(),
    };

    let Some(connections) = registry.connections(&client.name) else {
        return ApiError::forbidden().into_response();
    };

    let Ok(accept) = HeaderValue::from_str(&derive_accept_key(&key)) else {
        return ApiError::bad_request("Invalid websocket key").into_response();
    };

    let on_upgrade = hyper::upgrade::on(&mut request);
    let name = client.name;
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let stream = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    Some(frame_config()),
                )
                .await;
                tracing::info!(client = %name, remote = ?peer, "Connector attached");
                if let Err(e) = connections.serve(stream, peer).await {
                    tracing::debug!(client = %name, error = %e, "Connector refused");
                }
                tracing::info!(client = %name, remote = ?peer, "Connector detached");
            }
            Err(e) => tracing::warn!(client = %name, error = %e, "Websocket upgrade failed"),
        }
    });

    HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header(UPGRADE, HeaderValue::from_static("websocket"))
        .with_header(CONNECTION, HeaderValue::from_static("Upgrade"))
        .with_header(SEC_WEBSOCKET_ACCEPT, accept)
}
