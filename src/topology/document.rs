//! Raw definition documents and their content fingerprints.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// SHA-256 digest of a definition document's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of `content`.
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Lowercase hex rendering, as shown in logs and the admin API.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell documents apart in logs.
        write!(f, "{}", &self.to_hex()[..12])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// One observation of the definition source.
///
/// Produced by the watcher on each poll that sees new content and discarded
/// once the coordinator has parsed it.
#[derive(Debug, Clone)]
pub struct DefinitionDocument {
    content: Bytes,
    fingerprint: Fingerprint,
    observed_at: SystemTime,
}

impl DefinitionDocument {
    pub fn new(content: impl Into<Bytes>, observed_at: SystemTime) -> Self {
        let content = content.into();
        let fingerprint = Fingerprint::of(&content);
        Self {
            content,
            fingerprint,
            observed_at,
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Source timestamp (modification time when the source has one).
    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }
}
