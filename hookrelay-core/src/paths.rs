//! HTTP paths shared by server, connector and CLI.

use uuid::Uuid;

/// Version prefix of the JSON API
pub const API: &str = "/v1";
/// Admin client collection
pub const CLIENTS: &str = "/v1/clients";
/// Admin delete-by-uuid
pub const HOOK_BY_UUID: &str = "/v1/hookByUUID";
/// Hook collection (admin with a client segment, self-service without)
pub const HOOKS: &str = "/v1/hooks";
/// Websocket upgrade endpoint for connectors
pub const CONNECT: &str = "/v1/connect";
/// Public hook prefix
pub const HOOK_PREFIX: &str = "/h";
/// Server version endpoint
pub const VERSION: &str = "/version";

/// Product name used in version strings
pub const PRODUCT: &str = "HookRelay";

/// `"HookRelay <version>"`
pub fn version_string(version: &str) -> String {
    format!("{} {}", PRODUCT, version)
}

/// Resolve a hook reference that is either a bare uuid or a hook URL.
///
/// For URLs the uuid is the path segment after `/h/`.
pub fn hook_uuid_from_reference(reference: &str) -> Option<Uuid> {
    let reference = reference.trim();
    if let Ok(uuid) = Uuid::parse_str(reference) {
        return Some(uuid);
    }

    let marker = format!("{}/", HOOK_PREFIX);
    let (_, tail) = reference.rsplit_once(marker.as_str())?;
    let segment = tail.split(['/', '?', '#']).next()?;
    Uuid::parse_str(segment).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    #[test]
    fn test_bare_uuid() {
        assert_eq!(hook_uuid_from_reference(ID).unwrap().to_string(), ID);
    }

    #[test]
    fn test_hook_url() {
        let url = format!("https://relay.example.com:12842/h/{ID}");
        assert_eq!(hook_uuid_from_reference(&url).unwrap().to_string(), ID);

        let with_query = format!("http://localhost:12840/h/{ID}?x=1");
        assert_eq!(hook_uuid_from_reference(&with_query).unwrap().to_string(), ID);
    }

    #[test]
    fn test_garbage() {
        assert!(hook_uuid_from_reference("orders").is_none());
        assert!(hook_uuid_from_reference("http://localhost/h/not-a-uuid").is_none());
        assert!(hook_uuid_from_reference("").is_none());
    }

    #[test]
    fn test_version_string() {
        assert_eq!(version_string("0.1.0"), "HookRelay 0.1.0");
    }
}
