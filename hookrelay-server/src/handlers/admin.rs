//! Loopback administrative API.

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Json};
use crate::routing::Router;
use hookrelay_core::{Registry, RegistryError, paths};
use std::sync::Arc;

pub fn router(registry: Arc<Registry>) -> Router {
    let list = registry.clone();
    let add = registry.clone();
    let regen = registry.clone();
    let remove = registry.clone();
    let add_hook = registry.clone();
    let remove_hook = registry;

    Router::new()
        .get(paths::CLIENTS, move |_req| {
            let registry = list.clone();
            async move { Json(registry.clients()).into_response() }
        })
        .post(&format!("{}/:name", paths::CLIENTS), move |req| {
            let registry = add.clone();
            async move {
                let secret = registry.add_client(param(&req, "name")?)?;
                Ok(HttpResponse::ok().with_text(secret))
            }
        })
        .patch(&format!("{}/:name", paths::CLIENTS), move |req| {
            let registry = regen.clone();
            async move {
                let secret = registry.regenerate_secret(param(&req, "name")?)?;
                Ok(HttpResponse::ok().with_text(secret))
            }
        })
        .delete(&format!("{}/:name", paths::CLIENTS), move |req| {
            let registry = remove.clone();
            async move {
                registry.remove_client(param(&req, "name")?)?;
                Ok(HttpResponse::ok())
            }
        })
        .put(&format!("{}/:client/:identifier", paths::HOOKS), move |req| {
            let registry = add_hook.clone();
            async move {
                let hook = registry.add_hook(param(&req, "client")?, param(&req, "identifier")?)?;
                Ok(HttpResponse::created().with_json(&hook))
            }
        })
        .delete(&format!("{}/:reference", paths::HOOK_BY_UUID), move |req| {
            let registry = remove_hook.clone();
            async move {
                let reference = param(&req, "reference")?;
                let uuid = paths::hook_uuid_from_reference(reference)
                    .ok_or_else(|| RegistryError::HookNotExists(reference.to_string()))?;
                registry.delete_hook_by_uuid(&uuid)?;
                Ok(HttpResponse::ok())
            }
        })
        .get(paths::VERSION, |_req| async {
            Ok(HttpResponse::ok().with_text(paths::version_string(hookrelay_core::VERSION)))
        })
}

pub(crate) fn param<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, ApiError> {
    req.param(name)
        .ok_or_else(|| ApiError::bad_request(format!("missing path parameter '{name}'")))
}
