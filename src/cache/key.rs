//! Request fingerprinting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Request;

/// Bumped whenever the canonical encoding changes, so old entries stop matching.
const SCHEME: &str = "bug-oracle/fingerprint/v1";

/// Fixed-length (64 hex chars) key derived from a request's full content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 over the length-prefixed fields of `request`.
///
/// Each field is encoded as `name:len:bytes`, so moving text from one field
/// into its neighbour always changes the digest.
pub fn fingerprint(request: &Request) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(SCHEME.as_bytes());
    for (name, value) in request.canonical_fields() {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
    }
    let hash: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    Fingerprint(hash)
}
