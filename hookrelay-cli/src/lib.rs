//! HookRelay admin client.
//!
//! Talks to the loopback admin API of a running `hookrelay-server`. The
//! `hookrelay` binary is a thin clap front end over [`AdminClient`].

mod error;

pub use error::{CliError, CliResult};

use chrono::{DateTime, Utc};
use hookrelay_core::{Client, Webhook, paths};
use serde::Deserialize;
use std::time::Duration;

/// Default admin API address
pub const DEFAULT_URL: &str = "http://localhost:12841";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Printed for successful calls without a body
pub const SUCCESS: &str = "Success.";

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the admin API.
#[derive(Debug, Clone)]
pub struct AdminClient {
    base: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> CliResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Create a client, returning its secret.
    pub async fn add_client(&self, name: &str) -> CliResult<String> {
        let url = self.url(&format!("{}/{}", paths::CLIENTS, urlencoding::encode(name)));
        text(self.http.post(url).send().await?).await
    }

    pub async fn delete_client(&self, name: &str) -> CliResult<String> {
        let url = self.url(&format!("{}/{}", paths::CLIENTS, urlencoding::encode(name)));
        text(self.http.delete(url).send().await?).await
    }

    /// Issue a new secret for a client, returning it.
    pub async fn regenerate_secret(&self, name: &str) -> CliResult<String> {
        let url = self.url(&format!("{}/{}", paths::CLIENTS, urlencoding::encode(name)));
        text(self.http.patch(url).send().await?).await
    }

    pub async fn list_clients(&self) -> CliResult<Vec<Client>> {
        let body = success_body(self.http.get(self.url(paths::CLIENTS)).send().await?).await?;
        serde_json::from_slice(&body).map_err(|e| CliError::InvalidResponse(e.to_string()))
    }

    pub async fn add_hook(&self, client: &str, identifier: &str) -> CliResult<Webhook> {
        let url = self.url(&format!(
            "{}/{}/{}",
            paths::HOOKS,
            urlencoding::encode(client),
            urlencoding::encode(identifier)
        ));
        let body = success_body(self.http.put(url).send().await?).await?;
        serde_json::from_slice(&body).map_err(|e| CliError::InvalidResponse(e.to_string()))
    }

    /// Delete a hook by uuid or by its full URL.
    pub async fn delete_hook(&self, reference: &str) -> CliResult<String> {
        let url = self.url(&format!(
            "{}/{}",
            paths::HOOK_BY_UUID,
            urlencoding::encode(reference)
        ));
        text(self.http.delete(url).send().await?).await
    }

    pub async fn server_version(&self) -> CliResult<String> {
        text(self.http.get(self.url(paths::VERSION)).send().await?).await
    }
}

async fn success_body(response: reqwest::Response) -> CliResult<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?.to_vec();
    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty());
    Err(CliError::Server {
        status: status.as_u16(),
        message,
    })
}

/// Body text of a successful response, or [`SUCCESS`] when empty.
async fn text(response: reqwest::Response) -> CliResult<String> {
    let body = success_body(response).await?;
    if body.is_empty() {
        Ok(SUCCESS.to_string())
    } else {
        Ok(String::from_utf8_lossy(&body).trim_end().to_string())
    }
}

/// `02 Jan 06 15:04 UTC`
pub fn format_rfc822(time: &DateTime<Utc>) -> String {
    time.format("%d %b %y %H:%M UTC").to_string()
}

/// One line per client for `client list`.
pub fn client_line(client: &Client) -> String {
    format!(
        "Name: {}, Hooks: {}, LastAction: {}",
        client.name,
        client.hooks.len(),
        format_rfc822(&client.last_action)
    )
}
