//! Flat key-value encoding of clients and hooks.
//!
//! Every field lives under its own key, segments joined by `.`:
//!
//! ```text
//! <name>.Secret                        hex SHA-256 of the secret
//! <name>.CreatedAt                     RFC 3339, UTC, nanoseconds
//! <name>.LastAction
//! <name>.Hooks.<identifier>.URL
//! <name>.Hooks.<identifier>.UUID
//! <name>.Hooks.<identifier>.CreatedAt
//! <name>.Hooks.<identifier>.LastCall
//! ```
//!
//! Client names never contain the delimiter. Hook identifiers may, so on
//! load the field tag is the last segment and the identifier is everything
//! between `Hooks` and that tag.

use crate::credentials::SecretDigest;
use crate::error::{RegistryError, Result};
use crate::model::{Client, Webhook};
use chrono::{DateTime, SecondsFormat, Utc};
use hookrelay_store::{OrderedStore, WriteBatch};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Key segment delimiter
pub const DELIMITER: char = '.';

const SECRET: &str = "Secret";
const CREATED_AT: &str = "CreatedAt";
const LAST_ACTION: &str = "LastAction";
const HOOKS: &str = "Hooks";
const URL: &str = "URL";
const UUID: &str = "UUID";
const LAST_CALL: &str = "LastCall";

/// Encodes clients into an [`OrderedStore`] and reads them back.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn OrderedStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self { store }
    }

    /// Write every field of `client` in one transaction.
    ///
    /// The hook subtree is rewritten, so hooks no longer on the client are
    /// removed from storage as well.
    pub fn store(&self, client: &Client) -> Result<()> {
        let name = &client.name;
        let mut batch = WriteBatch::new();

        if let Some(secret) = &client.secret {
            batch.push_put(key(&[name, SECRET]), secret.as_hex());
        }
        batch.push_put(key(&[name, CREATED_AT]), encode_time(&client.created_at));
        batch.push_put(key(&[name, LAST_ACTION]), encode_time(&client.last_action));

        let mut batch = batch.delete_prefix(hooks_prefix(name));
        for (identifier, hook) in &client.hooks {
            batch.push_put(key(&[name, HOOKS, identifier, URL]), hook.url.as_str());
            batch.push_put(key(&[name, HOOKS, identifier, UUID]), hook.uuid.to_string());
            batch.push_put(
                key(&[name, HOOKS, identifier, CREATED_AT]),
                encode_time(&hook.created_at),
            );
            batch.push_put(
                key(&[name, HOOKS, identifier, LAST_CALL]),
                encode_time(&hook.last_call),
            );
        }

        self.store.apply(batch)?;
        Ok(())
    }

    /// Remove every key of client `name` in one transaction.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.store
            .apply(WriteBatch::new().delete_prefix(client_prefix(name)))?;
        Ok(())
    }

    /// Rebuild all clients from a full scan.
    pub fn load(&self) -> Result<BTreeMap<String, Client>> {
        let mut partial: HashMap<String, PartialClient> = HashMap::new();

        for (k, v) in self.store.scan()? {
            let Some((name, rest)) = k.split_once(DELIMITER) else {
                warn!(key = %k, "Skipping key without delimiter");
                continue;
            };
            let client = partial.entry(name.to_string()).or_default();

            match rest {
                SECRET => {
                    let digest = SecretDigest::from_hex(&v).ok_or_else(|| RegistryError::Decode {
                        key: k.clone(),
                        reason: "secret is not a SHA-256 hex digest".to_string(),
                    })?;
                    client.secret = Some(digest);
                }
                CREATED_AT => client.created_at = Some(decode_time(&k, &v)?),
                LAST_ACTION => client.last_action = Some(decode_time(&k, &v)?),
                _ => {
                    let hook_field = rest
                        .strip_prefix(HOOKS)
                        .and_then(|r| r.strip_prefix(DELIMITER))
                        .and_then(|r| r.rsplit_once(DELIMITER))
                        .filter(|(identifier, _)| !identifier.is_empty());

                    let Some((identifier, field)) = hook_field else {
                        debug!(key = %k, "Ignoring unknown key");
                        continue;
                    };
                    let hook = client.hooks.entry(identifier.to_string()).or_default();
                    match field {
                        URL => hook.url = Some(v),
                        UUID => {
                            let uuid = Uuid::parse_str(&v).map_err(|e| RegistryError::Decode {
                                key: k.clone(),
                                reason: e.to_string(),
                            })?;
                            hook.uuid = Some(uuid);
                        }
                        CREATED_AT => hook.created_at = Some(decode_time(&k, &v)?),
                        LAST_CALL => hook.last_call = Some(decode_time(&k, &v)?),
                        _ => debug!(key = %k, "Ignoring unknown hook field"),
                    }
                }
            }
        }

        Ok(partial
            .into_iter()
            .map(|(name, p)| {
                let client = p.finish(&name);
                (name, client)
            })
            .collect())
    }
}

#[derive(Default)]
struct PartialClient {
    secret: Option<SecretDigest>,
    created_at: Option<DateTime<Utc>>,
    last_action: Option<DateTime<Utc>>,
    hooks: BTreeMap<String, PartialHook>,
}

#[derive(Default)]
struct PartialHook {
    url: Option<String>,
    uuid: Option<Uuid>,
    created_at: Option<DateTime<Utc>>,
    last_call: Option<DateTime<Utc>>,
}

impl PartialClient {
    fn finish(self, name: &str) -> Client {
        if self.secret.is_none() {
            warn!(client = name, "Stored client has no secret and cannot authenticate");
        }

        let mut hooks = BTreeMap::new();
        for (identifier, hook) in self.hooks {
            let (Some(url), Some(uuid)) = (hook.url, hook.uuid) else {
                warn!(client = name, hook = %identifier, "Dropping stored hook without URL or UUID");
                continue;
            };
            hooks.insert(
                identifier.clone(),
                Webhook {
                    url,
                    identifier,
                    uuid,
                    created_at: hook.created_at.unwrap_or_default(),
                    last_call: hook.last_call.unwrap_or_default(),
                },
            );
        }

        Client {
            name: name.to_string(),
            secret: self.secret,
            created_at: self.created_at.unwrap_or_default(),
            last_action: self.last_action.unwrap_or_default(),
            hooks,
        }
    }
}

fn key(segments: &[&str]) -> String {
    let mut key = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            key.push(DELIMITER);
        }
        key.push_str(segment);
    }
    key
}

fn client_prefix(name: &str) -> String {
    format!("{}{}", name, DELIMITER)
}

fn hooks_prefix(name: &str) -> String {
    format!("{name}{DELIMITER}{HOOKS}{DELIMITER}")
}

fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookrelay_store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Persistence) {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone());
        (store, persistence)
    }

    fn client_with_hooks(name: &str, identifiers: &[&str]) -> Client {
        let mut client = Client::new(name, SecretDigest::of(&format!("{name}:token")));
        for (i, identifier) in identifiers.iter().enumerate() {
            let uuid = Uuid::from_u128(i as u128 + 1);
            let hook = Webhook::new(*identifier, uuid, format!("http://localhost:12840/h/{uuid}"));
            client.hooks.insert(identifier.to_string(), hook);
        }
        client
    }

    #[test]
    fn test_key_layout() {
        let (store, persistence) = setup();
        persistence.store(&client_with_hooks("acme", &["orders"])).unwrap();

        let keys: Vec<String> = store.scan().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "acme.CreatedAt",
                "acme.Hooks.orders.CreatedAt",
                "acme.Hooks.orders.LastCall",
                "acme.Hooks.orders.URL",
                "acme.Hooks.orders.UUID",
                "acme.LastAction",
                "acme.Secret",
            ]
        );
    }

    #[test]
    fn test_roundtrip() {
        let (_, persistence) = setup();
        let original = client_with_hooks("acme", &["orders", "billing"]);
        persistence.store(&original).unwrap();

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["acme"], original);
    }

    #[test]
    fn test_identifier_with_delimiter() {
        let (_, persistence) = setup();
        let original = client_with_hooks("acme", &["github.push.main"]);
        persistence.store(&original).unwrap();

        let loaded = persistence.load().unwrap();
        assert!(loaded["acme"].hooks.contains_key("github.push.main"));
        assert_eq!(loaded["acme"], original);
    }

    #[test]
    fn test_store_drops_removed_hooks() {
        let (store, persistence) = setup();
        let mut client = client_with_hooks("acme", &["orders", "billing"]);
        persistence.store(&client).unwrap();

        client.hooks.remove("orders");
        persistence.store(&client).unwrap();

        assert!(store.scan_prefix("acme.Hooks.orders.").unwrap().is_empty());
        assert_eq!(persistence.load().unwrap()["acme"].hooks.len(), 1);
    }

    #[test]
    fn test_delete_is_prefix_isolated() {
        let (_, persistence) = setup();
        persistence.store(&client_with_hooks("acme", &["orders"])).unwrap();
        persistence.store(&client_with_hooks("acme2", &["orders"])).unwrap();
        persistence.store(&client_with_hooks("acm", &["orders"])).unwrap();

        persistence.delete("acme").unwrap();

        let loaded = persistence.load().unwrap();
        assert_eq!(
            loaded.keys().cloned().collect::<Vec<_>>(),
            vec!["acm".to_string(), "acme2".to_string()]
        );
        assert_eq!(loaded["acme2"].hooks.len(), 1);
    }

    #[test]
    fn test_bad_timestamp_aborts_load() {
        let (store, persistence) = setup();
        store
            .apply(WriteBatch::new().put("acme.CreatedAt", "yesterday"))
            .unwrap();

        let err = persistence.load().unwrap_err();
        assert!(matches!(err, RegistryError::Decode { ref key, .. } if key == "acme.CreatedAt"));
    }

    #[test]
    fn test_bad_uuid_aborts_load() {
        let (store, persistence) = setup();
        store
            .apply(WriteBatch::new().put("acme.Hooks.orders.UUID", "nope"))
            .unwrap();
        assert!(matches!(
            persistence.load(),
            Err(RegistryError::Decode { .. })
        ));
    }

    #[test]
    fn test_unknown_and_incomplete_keys() {
        let (store, persistence) = setup();
        store
            .apply(
                WriteBatch::new()
                    .put("acme.Nickname", "ac")
                    .put("orphan", "x")
                    .put("acme.Hooks.half.URL", "http://localhost:12840/h/x")
                    .put("acme.Hooks.orders.Colour", "blue"),
            )
            .unwrap();

        let loaded = persistence.load().unwrap();
        let acme = &loaded["acme"];
        assert!(acme.secret.is_none());
        assert!(acme.hooks.is_empty());
        assert!(!loaded.contains_key("orphan"));
    }

    #[test]
    fn test_time_encoding_is_fixed_width_utc() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(encode_time(&time), "2024-05-01T10:00:00.000000000Z");
        assert_eq!(decode_time("k", &encode_time(&time)).unwrap(), time);
    }
}
