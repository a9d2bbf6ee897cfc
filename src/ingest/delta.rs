//! Delta detection
//!
//! Decides whether a freshly fetched payload is worth processing. Upstream
//! sources frequently lack working conditional-request support, so the
//! sha256 content hash is the authoritative change signal; the conditional
//! token (ETag) is stored only so an unchanged body need not transfer at
//! all when the upstream does honor it.

use sha2::{Digest, Sha256};

/// Result of comparing a fetched payload against the last processed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Transport reported not-modified; nothing transferred, nothing to do.
    NotModified,
    /// Body transferred but hashes identically to the last processed one.
    Unchanged { hash: String },
    /// Genuine change; proceed to parsing and mapping.
    Changed { hash: String },
}

impl DeltaOutcome {
    /// The content hash to persist with this cycle's bookkeeping, if any.
    pub fn hash(&self) -> Option<&str> {
        match self {
            DeltaOutcome::NotModified => None,
            DeltaOutcome::Unchanged { hash } | DeltaOutcome::Changed { hash } => Some(hash),
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, DeltaOutcome::Changed { .. })
    }
}

/// Stateless detector comparing fetched bodies to stored hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaDetector;

impl DeltaDetector {
    /// Classify a fetched body against the source's stored content hash.
    pub fn classify(
        &self,
        transport_not_modified: bool,
        body: &[u8],
        last_content_hash: Option<&str>,
    ) -> DeltaOutcome {
        if transport_not_modified {
            return DeltaOutcome::NotModified;
        }

        let hash = content_hash(body);
        if last_content_hash == Some(hash.as_str()) {
            DeltaOutcome::Unchanged { hash }
        } else {
            DeltaOutcome::Changed { hash }
        }
    }
}

/// Hex sha256 digest of a payload body.
pub fn content_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}
