// HookRelay - public webhook URLs relayed to clients over websockets
//
// Each client owns hooks with unguessable public URLs. Calls to a hook are
// captured and pushed, as raw HTTP requests, to every relay connection the
// owning client holds open.

// Re-export member crates
pub use hookrelay_client as client;
pub use hookrelay_config as config;
pub use hookrelay_core as registry;
pub use hookrelay_log as log;
pub use hookrelay_server as server;
pub use hookrelay_store as store;
pub use hookrelay_websocket as websocket;

// Prelude for common imports
pub mod prelude {
    pub use hookrelay_client::{Connector, ConnectorError, ConnectorState, Requests};
    pub use hookrelay_config::ServerSettings;
    pub use hookrelay_core::{Client, HookUrlBase, Registry, RegistryError, Webhook};
    pub use hookrelay_server::{Listeners, RelayServer, TlsConfig};
    pub use hookrelay_store::{MemoryStore, OrderedStore, SqliteStore};
}
