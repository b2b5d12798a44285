//! # HookRelay server
//!
//! Two HTTP surfaces over one [`Registry`]:
//!
//! - the admin API, bound to loopback only, manages clients and hooks;
//! - the public API captures calls to hook URLs, lets clients manage their
//!   own hooks and upgrades `/v1/connect` into a relay connection.
//!
//! With TLS configured the public API is served on the TLS port and the
//! plaintext port only redirects there.
//!
//! ```rust,no_run
//! use hookrelay_config::ServerSettings;
//!
//! # async fn run() -> Result<(), hookrelay_server::ServerError> {
//! let settings = ServerSettings::load(None)?;
//! hookrelay_server::run(settings).await
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod handlers;
pub mod http;
pub mod routing;
pub mod server;
pub mod tls;

pub use error::{ApiError, Result, ServerError};
pub use server::{Listeners, RelayServer};
pub use tls::TlsConfig;

use hookrelay_config::ServerSettings;
use hookrelay_core::Registry;
use hookrelay_store::SqliteStore;
use hookrelay_websocket::RelayConfig;
use std::sync::Arc;

/// Relay transport tuning from settings
pub fn relay_config(settings: &ServerSettings) -> RelayConfig {
    RelayConfig {
        send_timeout: settings.send_timeout(),
        queue_capacity: settings.connection_queue.max(1),
    }
}

/// TLS material from settings, when both files are configured.
pub fn tls_config(settings: &ServerSettings) -> Result<Option<TlsConfig>> {
    match (&settings.ssl_certificate, &settings.ssl_key) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig::from_pem_files(cert, key)?)),
        _ => Ok(None),
    }
}

/// Open the store, load the registry, bind and serve until Ctrl-C.
pub async fn run(settings: ServerSettings) -> Result<()> {
    let tls = tls_config(&settings)?;
    let listeners = Listeners::bind(&settings).await?;

    let store = Arc::new(SqliteStore::open(&settings.database_path)?);
    let registry = Registry::builder(store)
        .url_base(listeners.hook_url_base(&settings)?)
        .relay_config(relay_config(&settings))
        .load()?;
    tracing::info!(
        clients = registry.clients().len(),
        database = %settings.database_path.display(),
        "Registry loaded"
    );

    RelayServer::new(Arc::new(registry), tls)
        .with_body_limit(settings.max_body_bytes)
        .serve(listeners, shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
