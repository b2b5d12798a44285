// Bearer authentication guard

use crate::error::ApiError;
use hookrelay_core::{Client, Registry};
use http::HeaderMap;
use http::header::AUTHORIZATION;

const BEARER: &str = "Bearer ";

/// Extract the bearer token, if the header is well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER)?.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the calling client from `Authorization: Bearer <name>:<token>`.
///
/// Every failure is the same bodyless 403.
pub fn authenticate(registry: &Registry, headers: &HeaderMap) -> Result<Client, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::forbidden)?;
    match registry.validate_client(token) {
        Some(client) => Ok(client),
        None => {
            tracing::debug!("Rejected client credentials");
            Err(ApiError::forbidden())
        }
    }
}
