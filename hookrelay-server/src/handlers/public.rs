//! Internet-facing API: hook capture and client self-service.

use super::admin::param;
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Json};
use crate::routing::Router;
use hookrelay_core::{Registry, paths};
use hookrelay_websocket::{MAX_FRAME_SIZE, encode_request};
use http::StatusCode;
use std::sync::Arc;
use uuid::Uuid;

pub fn router(registry: Arc<Registry>) -> Router {
    let list = registry.clone();
    let add = registry.clone();
    let remove = registry.clone();
    let capture = registry;

    Router::new()
        .get(paths::HOOKS, move |req| {
            let registry = list.clone();
            async move {
                let client = authenticate(&registry, &req.headers)?;
                Json(client.hook_list()).into_response()
            }
        })
        .put(&format!("{}/:identifier", paths::HOOKS), move |req| {
            let registry = add.clone();
            async move {
                let client = authenticate(&registry, &req.headers)?;
                let hook = registry.add_hook(&client.name, param(&req, "identifier")?)?;
                Ok(HttpResponse::created().with_json(&hook))
            }
        })
        .delete(&format!("{}/:identifier", paths::HOOKS), move |req| {
            let registry = remove.clone();
            async move {
                let client = authenticate(&registry, &req.headers)?;
                registry.delete_hook(&client.name, param(&req, "identifier")?)?;
                Ok(HttpResponse::ok())
            }
        })
        .any(&format!("{}/:uuid", paths::HOOK_PREFIX), move |req| {
            let registry = capture.clone();
            async move { relay_hook(&registry, req).await }
        })
}

/// Capture a call to a public hook and push it to the owner's connections.
async fn relay_hook(registry: &Registry, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let reference = param(&req, "uuid")?;
    let uuid = Uuid::parse_str(reference)
        .map_err(|_| ApiError::bad_gateway(format!("Hook '{reference}' not found")))?;

    let relay = req
        .to_relay_request()
        .map_err(|e| ApiError::bad_gateway(format!("Could not rebuild request: {e}")))?;

    let frame = encode_request(&relay);
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request does not fit in a {MAX_FRAME_SIZE} byte relay frame"),
        ));
    }

    match registry.handle_hook(&uuid, frame).await {
        Ok(delivered) => {
            tracing::debug!(hook = %uuid, delivered, "Relayed hook call");
            Ok(HttpResponse::ok())
        }
        Err(e) => {
            tracing::info!(hook = %uuid, error = %e, "Hook call not relayed");
            Err(ApiError::bad_gateway(e.to_string()))
        }
    }
}
