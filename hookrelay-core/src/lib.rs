//! HookRelay core
//!
//! The registry of clients and their hooks, the flat key-value encoding
//! that persists them, and the credentials clients authenticate with.
//!
//! # Example
//!
//! ```rust,no_run
//! use hookrelay_core::{HookUrlBase, Registry};
//! use hookrelay_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("/var/lib/hookrelay/hooks.db")?);
//! let registry = Registry::builder(store)
//!     .url_base(HookUrlBase::new("https", "relay.example.com", 12842))
//!     .load()?;
//!
//! let secret = registry.add_client("acme")?;
//! let hook = registry.add_hook("acme", "orders")?;
//! println!("{} -> {}", secret, hook.url);
//! # Ok(())
//! # }
//! ```

pub mod credentials;
mod error;
mod model;
pub mod paths;
pub mod persistence;
mod registry;

pub use credentials::{HookUrlBase, OsRandom, RandomSource, SecretDigest};
pub use error::{ErrorKind, RegistryError, Result};
pub use model::{Client, Webhook};
pub use persistence::Persistence;
pub use registry::{Registry, RegistryBuilder};

/// Crate version, reported by `GET /version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
