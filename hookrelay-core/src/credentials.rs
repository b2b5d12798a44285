//! Secret generation and validation, hook uuids and URLs.
//!
//! A secret is `<name>:<token>` where the token is 32 random bytes encoded
//! as URL-safe base64. Only the SHA-256 digest of the whole secret is kept;
//! validation hashes the presented secret and compares digests in constant
//! time.

use crate::error::{RegistryError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io;
use uuid::Uuid;

/// Random bytes drawn for each secret
pub const SECRET_BYTE_LENGTH: usize = 32;

/// Separates the client name from the token
pub const SECRET_SEPARATOR: char = ':';

/// Characters a client name must not contain
pub const FORBIDDEN_NAME_CHARS: [char; 3] = ['.', ':', '/'];

/// Source of random bytes.
///
/// `read` may fill fewer bytes than asked for; callers treat a short read
/// as failure.
pub trait RandomSource: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(io::Error::other)?;
        Ok(buf.len())
    }
}

/// Hex SHA-256 digest of a plaintext secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDigest(String);

impl SecretDigest {
    pub fn of(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a stored hex digest, checking its shape
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let decoded = hex::decode(hex_digest).ok()?;
        (decoded.len() == 32).then(|| Self(hex_digest.to_ascii_lowercase()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Constant-time check of a presented plaintext secret
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_compare(&self.0, &Self::of(presented).0)
    }
}

/// Freshly generated secret: plaintext for the caller, digest for storage.
#[derive(Debug, Clone)]
pub struct IssuedSecret {
    pub plaintext: String,
    pub digest: SecretDigest,
}

/// Reject names that would break keys, secrets or URLs.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name is empty",
        });
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "name must not contain '.', ':' or '/'",
        });
    }
    Ok(())
}

/// Generate a secret for `name`.
pub fn generate_secret(name: &str, random: &dyn RandomSource) -> Result<IssuedSecret> {
    let mut bytes = [0u8; SECRET_BYTE_LENGTH];
    let got = random
        .read(&mut bytes)
        .map_err(|e| RegistryError::SecretGenerationFailed(e.to_string()))?;
    if got < SECRET_BYTE_LENGTH {
        return Err(RegistryError::SecretTooShort {
            got,
            want: SECRET_BYTE_LENGTH,
        });
    }

    let plaintext = format!("{}{}{}", name, SECRET_SEPARATOR, URL_SAFE.encode(bytes));
    let digest = SecretDigest::of(&plaintext);
    Ok(IssuedSecret { plaintext, digest })
}

/// Split a presented secret into name and token.
///
/// The token alphabet never contains `:`, so the last separator wins.
pub fn split_secret(presented: &str) -> Option<(&str, &str)> {
    let (name, token) = presented.rsplit_once(SECRET_SEPARATOR)?;
    if name.is_empty() || token.is_empty() {
        return None;
    }
    Some((name, token))
}

/// Draw a version 4 uuid from `random`.
pub fn generate_uuid(random: &dyn RandomSource) -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    let got = random
        .read(&mut bytes)
        .map_err(|e| RegistryError::CreatingUuidFailed(e.to_string()))?;
    if got < bytes.len() {
        return Err(RegistryError::CreatingUuidFailed(format!(
            "only {} of 16 random bytes available",
            got
        )));
    }
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// Builds public hook URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookUrlBase {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HookUrlBase {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// `<scheme>://<host>:<port>/h/<uuid>`
    pub fn url_for(&self, uuid: &Uuid) -> String {
        format!(
            "{}://{}:{}{}/{}",
            self.scheme,
            self.host,
            self.port,
            crate::paths::HOOK_PREFIX,
            uuid
        )
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_secret_format() {
        let issued = generate_secret("acme", &OsRandom).unwrap();
        let (name, token) = split_secret(&issued.plaintext).unwrap();

        assert_eq!(name, "acme");
        assert_eq!(URL_SAFE.decode(token).unwrap().len(), SECRET_BYTE_LENGTH);
        assert_eq!(issued.digest.as_hex().len(), 64);
        assert!(issued.digest.matches(&issued.plaintext));
    }

    #[test]
    fn test_secrets_differ() {
        let a = generate_secret("acme", &OsRandom).unwrap();
        let b = generate_secret("acme", &OsRandom).unwrap();
        assert_ne!(a.plaintext, b.plaintext);
        assert!(!a.digest.matches(&b.plaintext));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let err = generate_secret("acme", &ShortRandom { limit: 10 }).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::SecretTooShort { got: 10, want: 32 }
        ));

        let err = generate_uuid(&ShortRandom { limit: 4 }).unwrap_err();
        assert!(matches!(err, RegistryError::CreatingUuidFailed(_)));
    }

    #[test]
    fn test_uuid_is_v4() {
        let uuid = generate_uuid(&CountingRandom::default()).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
        assert_ne!(uuid, generate_uuid(&OsRandom).unwrap());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("acme").is_ok());
        assert!(validate_name("acme-corp_2").is_ok());
        for bad in ["", "a.b", "a:b", "a/b"] {
            assert!(
                matches!(validate_name(bad), Err(RegistryError::InvalidName { .. })),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_split_secret() {
        assert_eq!(split_secret("acme:tok"), Some(("acme", "tok")));
        assert_eq!(split_secret("acme"), None);
        assert_eq!(split_secret(":tok"), None);
        assert_eq!(split_secret("acme:"), None);
    }

    #[test]
    fn test_digest_from_hex() {
        let digest = SecretDigest::of("acme:tok");
        assert_eq!(SecretDigest::from_hex(digest.as_hex()), Some(digest.clone()));
        assert_eq!(
            SecretDigest::from_hex(&digest.as_hex().to_uppercase()),
            Some(digest)
        );
        assert!(SecretDigest::from_hex("abcd").is_none());
        assert!(SecretDigest::from_hex("zz").is_none());
    }

    #[test]
    fn test_hook_url() {
        let base = HookUrlBase::new("https", "relay.example.com", 12842);
        let uuid = Uuid::nil();
        assert_eq!(
            base.url_for(&uuid),
            "https://relay.example.com:12842/h/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
