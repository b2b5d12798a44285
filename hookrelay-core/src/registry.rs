//! The client and hook registry.
//!
//! Every hook is reachable from its client's identifier map and from the
//! server-wide uuid index. Both are only changed together, under one write
//! lock, and only after the change has been persisted.

use crate::credentials::{
    HookUrlBase, OsRandom, RandomSource, generate_secret, generate_uuid, split_secret,
    validate_name,
};
use crate::error::{RegistryError, Result};
use crate::model::{Client, Webhook};
use crate::persistence::Persistence;
use bytes::Bytes;
use chrono::Utc;
use hookrelay_store::OrderedStore;
use hookrelay_websocket::{ConnectionSet, RelayConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ClientEntry {
    client: Client,
    connections: Arc<ConnectionSet>,
}

#[derive(Clone)]
struct HookRef {
    client: String,
    identifier: String,
}

#[derive(Default)]
struct RegistryState {
    clients: HashMap<String, ClientEntry>,
    hooks: HashMap<Uuid, HookRef>,
}

/// Builder for [`Registry`]
pub struct RegistryBuilder {
    store: Arc<dyn OrderedStore>,
    url_base: HookUrlBase,
    relay: RelayConfig,
    random: Arc<dyn RandomSource>,
}

impl RegistryBuilder {
    /// Scheme, host and port written into new hook URLs
    pub fn url_base(mut self, url_base: HookUrlBase) -> Self {
        self.url_base = url_base;
        self
    }

    /// Transport settings for every client's connection set
    pub fn relay_config(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Random source for secrets and uuids
    pub fn random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Load every stored client and build the registry.
    pub fn load(self) -> Result<Registry> {
        let persistence = Persistence::new(self.store);
        let mut state = RegistryState::default();

        for (name, client) in persistence.load()? {
            for hook in client.hooks.values() {
                if let Some(existing) = state.hooks.get(&hook.uuid) {
                    warn!(
                        uuid = %hook.uuid,
                        client = %name,
                        owner = %existing.client,
                        "Stored hook uuid already taken, it will not be reachable"
                    );
                    continue;
                }
                state.hooks.insert(
                    hook.uuid,
                    HookRef {
                        client: name.clone(),
                        identifier: hook.identifier.clone(),
                    },
                );
            }
            state.clients.insert(
                name,
                ClientEntry {
                    client,
                    connections: Arc::new(ConnectionSet::new(self.relay)),
                },
            );
        }

        info!(
            clients = state.clients.len(),
            hooks = state.hooks.len(),
            "Registry loaded"
        );

        Ok(Registry {
            state: RwLock::new(state),
            persistence,
            url_base: self.url_base,
            relay: self.relay,
            random: self.random,
        })
    }
}

/// In-memory authority over clients, hooks and their live connections.
pub struct Registry {
    state: RwLock<RegistryState>,
    persistence: Persistence,
    url_base: HookUrlBase,
    relay: RelayConfig,
    random: Arc<dyn RandomSource>,
}

impl Registry {
    pub fn builder(store: Arc<dyn OrderedStore>) -> RegistryBuilder {
        RegistryBuilder {
            store,
            url_base: HookUrlBase::new("http", "127.0.0.1", 12840),
            relay: RelayConfig::default(),
            random: Arc::new(OsRandom),
        }
    }

    pub fn url_base(&self) -> &HookUrlBase {
        &self.url_base
    }

    /// Create a client and return its plaintext secret.
    ///
    /// The secret is not retained; only its digest is stored.
    pub fn add_client(&self, name: &str) -> Result<String> {
        validate_name(name)?;

        let mut state = self.state.write();
        if state.clients.contains_key(name) {
            return Err(RegistryError::ClientExists(name.to_string()));
        }

        let issued = generate_secret(name, self.random.as_ref())?;
        let client = Client::new(name, issued.digest);
        self.persistence.store(&client)?;

        state.clients.insert(
            name.to_string(),
            ClientEntry {
                client,
                connections: Arc::new(ConnectionSet::new(self.relay)),
            },
        );
        info!(client = name, "Client added");
        Ok(issued.plaintext)
    }

    /// Delete a client, its stored keys, hooks and live connections.
    pub fn remove_client(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let connections = state
            .clients
            .get(name)
            .map(|entry| Arc::clone(&entry.connections))
            .ok_or_else(|| RegistryError::ClientNotExists(name.to_string()))?;

        self.persistence.delete(name)?;
        let closed = connections.close_all();

        state.clients.remove(name);
        state.hooks.retain(|_, hook| hook.client != name);
        info!(client = name, connections = closed, "Client removed");
        Ok(())
    }

    /// Create hook `identifier` under `client`.
    pub fn add_hook(&self, client: &str, identifier: &str) -> Result<Webhook> {
        let mut state = self.state.write();
        let entry = state
            .clients
            .get(client)
            .ok_or_else(|| RegistryError::ClientNotExists(client.to_string()))?;
        if entry.client.hooks.contains_key(identifier) {
            return Err(RegistryError::HookExists(identifier.to_string()));
        }

        let uuid = generate_uuid(self.random.as_ref())?;
        if state.hooks.contains_key(&uuid) {
            return Err(RegistryError::CreatingUuidFailed(
                "generated uuid is already in use".to_string(),
            ));
        }

        let hook = Webhook::new(identifier, uuid, self.url_base.url_for(&uuid));
        let mut updated = entry.client.clone();
        updated.hooks.insert(identifier.to_string(), hook.clone());
        updated.touch();
        self.persistence.store(&updated)?;

        if let Some(entry) = state.clients.get_mut(client) {
            entry.client = updated;
        }
        state.hooks.insert(
            uuid,
            HookRef {
                client: client.to_string(),
                identifier: identifier.to_string(),
            },
        );
        info!(client, hook = identifier, %uuid, "Hook added");
        Ok(hook)
    }

    /// Delete hook `identifier` of `client`.
    pub fn delete_hook(&self, client: &str, identifier: &str) -> Result<()> {
        let mut state = self.state.write();
        self.delete_hook_locked(&mut state, client, identifier)
    }

    /// Delete the hook with `uuid`, whoever owns it.
    pub fn delete_hook_by_uuid(&self, uuid: &Uuid) -> Result<()> {
        let mut state = self.state.write();
        let hook = state
            .hooks
            .get(uuid)
            .cloned()
            .ok_or_else(|| RegistryError::HookNotExists(uuid.to_string()))?;
        self.delete_hook_locked(&mut state, &hook.client, &hook.identifier)
    }

    fn delete_hook_locked(
        &self,
        state: &mut RegistryState,
        client: &str,
        identifier: &str,
    ) -> Result<()> {
        let entry = state
            .clients
            .get(client)
            .ok_or_else(|| RegistryError::ClientNotExists(client.to_string()))?;

        let mut updated = entry.client.clone();
        let hook = updated
            .hooks
            .remove(identifier)
            .ok_or_else(|| RegistryError::HookNotExists(identifier.to_string()))?;
        updated.touch();
        self.persistence.store(&updated)?;

        if let Some(entry) = state.clients.get_mut(client) {
            entry.client = updated;
        }
        state.hooks.remove(&hook.uuid);
        info!(client, hook = identifier, uuid = %hook.uuid, "Hook deleted");
        Ok(())
    }

    /// Relay a captured request to every live connection of the hook's owner.
    ///
    /// Updates `lastCall`, broadcasts, then persists the owner. Individual
    /// connection failures are logged by the connection set. Returns the
    /// number of connections the request was queued on.
    pub async fn handle_hook(&self, uuid: &Uuid, request: Bytes) -> Result<usize> {
        let (client, connections) = self.touch_hook(uuid)?;

        let delivered = connections.broadcast(request).await;
        debug!(client = %client, %uuid, delivered, "Hook relayed");

        if connections.is_closed() {
            return Err(RegistryError::Relay(format!(
                "client '{}' was removed during delivery",
                client
            )));
        }

        self.persist_client(&client)?;
        Ok(delivered)
    }

    fn touch_hook(&self, uuid: &Uuid) -> Result<(String, Arc<ConnectionSet>)> {
        let mut state = self.state.write();
        let hook = state
            .hooks
            .get(uuid)
            .cloned()
            .ok_or_else(|| RegistryError::HookNotExists(uuid.to_string()))?;

        let entry = state
            .clients
            .get_mut(&hook.client)
            .ok_or_else(|| RegistryError::HookNotExists(uuid.to_string()))?;
        if let Some(webhook) = entry.client.hooks.get_mut(&hook.identifier) {
            webhook.last_call = Utc::now();
        }
        Ok((hook.client, Arc::clone(&entry.connections)))
    }

    /// Store the current state of `name`, if it still exists.
    fn persist_client(&self, name: &str) -> Result<()> {
        let state = self.state.write();
        if let Some(entry) = state.clients.get(name) {
            self.persistence.store(&entry.client)?;
        }
        Ok(())
    }

    /// Issue a new secret for `name`; the old one stops validating at once.
    pub fn regenerate_secret(&self, name: &str) -> Result<String> {
        let mut state = self.state.write();
        let entry = state
            .clients
            .get_mut(name)
            .ok_or_else(|| RegistryError::ClientNotExists(name.to_string()))?;

        let issued = generate_secret(name, self.random.as_ref())?;
        let mut updated = entry.client.clone();
        updated.secret = Some(issued.digest);
        updated.touch();
        self.persistence.store(&updated)?;

        entry.client = updated;
        info!(client = name, "Secret regenerated");
        Ok(issued.plaintext)
    }

    /// Resolve a presented `name:token` secret to its client.
    ///
    /// Never fails loudly: malformed input, unknown names and wrong tokens
    /// all yield `None`.
    pub fn validate_client(&self, presented: &str) -> Option<Client> {
        let Some((name, _)) = split_secret(presented) else {
            debug!("Rejected malformed secret");
            return None;
        };

        let state = self.state.read();
        let Some(entry) = state.clients.get(name) else {
            info!(client = name, "Rejected secret for unknown client");
            return None;
        };

        match &entry.client.secret {
            Some(digest) if digest.matches(presented) => Some(entry.client.clone()),
            _ => {
                warn!(client = name, "Rejected invalid secret");
                None
            }
        }
    }

    /// All clients, sorted by name
    pub fn clients(&self) -> Vec<Client> {
        let state = self.state.read();
        let mut clients: Vec<Client> = state.clients.values().map(|e| e.client.clone()).collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        clients
    }

    pub fn client(&self, name: &str) -> Option<Client> {
        self.state.read().clients.get(name).map(|e| e.client.clone())
    }

    /// Hooks of `name` in identifier order
    pub fn hooks(&self, name: &str) -> Result<Vec<Webhook>> {
        self.state
            .read()
            .clients
            .get(name)
            .map(|e| e.client.hook_list())
            .ok_or_else(|| RegistryError::ClientNotExists(name.to_string()))
    }

    /// Owner and identifier of the hook with `uuid`
    pub fn hook_owner(&self, uuid: &Uuid) -> Option<(String, String)> {
        self.state
            .read()
            .hooks
            .get(uuid)
            .map(|h| (h.client.clone(), h.identifier.clone()))
    }

    /// Live connection set of `name`
    pub fn connections(&self, name: &str) -> Option<Arc<ConnectionSet>> {
        self.state
            .read()
            .clients
            .get(name)
            .map(|e| Arc::clone(&e.connections))
    }

    /// Close every connection of every client. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let state = self.state.read();
        state
            .clients
            .values()
            .map(|e| e.connections.close_all())
            .sum()
    }
}
