//! Clients and their hooks.

use crate::credentials::SecretDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A public hook owned by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub url: String,
    pub identifier: String,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_call: DateTime<Utc>,
}

impl Webhook {
    pub fn new(identifier: impl Into<String>, uuid: Uuid, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            identifier: identifier.into(),
            uuid,
            created_at: now,
            last_call: now,
        }
    }
}

/// A registered tenant.
///
/// The secret digest never leaves the server: it is skipped when a client
/// is serialized, and deserialized clients carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub name: String,
    #[serde(skip)]
    pub secret: Option<SecretDigest>,
    pub created_at: DateTime<Utc>,
    pub last_action: DateTime<Utc>,
    #[serde(
        serialize_with = "hooks_as_list",
        deserialize_with = "hooks_from_list",
        default
    )]
    pub hooks: BTreeMap<String, Webhook>,
}

impl Client {
    pub fn new(name: impl Into<String>, secret: SecretDigest) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            secret: Some(secret),
            created_at: now,
            last_action: now,
            hooks: BTreeMap::new(),
        }
    }

    /// Hooks in identifier order
    pub fn hook_list(&self) -> Vec<Webhook> {
        self.hooks.values().cloned().collect()
    }

    pub fn touch(&mut self) {
        self.last_action = Utc::now();
    }
}

fn hooks_as_list<S: Serializer>(
    hooks: &BTreeMap<String, Webhook>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(hooks.values())
}

fn hooks_from_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, Webhook>, D::Error> {
    let list = Vec::<Webhook>::deserialize(deserializer)?;
    Ok(list
        .into_iter()
        .map(|hook| (hook.identifier.clone(), hook))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_json_hides_secret() {
        let mut client = Client::new("acme", SecretDigest::of("acme:token"));
        let hook = Webhook::new("orders", Uuid::nil(), "http://localhost:12840/h/0");
        client.hooks.insert(hook.identifier.clone(), hook);

        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["name"], "acme");
        assert!(json.get("secret").is_none());
        assert!(json["createdAt"].is_string());
        assert!(json["lastAction"].is_string());
        assert_eq!(json["hooks"][0]["identifier"], "orders");
        assert_eq!(json["hooks"][0]["uuid"], Uuid::nil().to_string());
        assert!(json["hooks"][0]["lastCall"].is_string());
    }

    #[test]
    fn test_client_json_roundtrip_drops_secret() {
        let mut client = Client::new("acme", SecretDigest::of("acme:token"));
        let hook = Webhook::new("orders", Uuid::nil(), "http://localhost:12840/h/0");
        client.hooks.insert(hook.identifier.clone(), hook);

        let text = serde_json::to_string(&client).unwrap();
        let back: Client = serde_json::from_str(&text).unwrap();

        assert_eq!(back.secret, None);
        assert_eq!(back.hooks, client.hooks);
        assert_eq!(back.last_action, client.last_action);
    }
}
