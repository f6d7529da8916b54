//! Content hashing of record identity fields.
//!
//! Every field is written length-prefixed after a per-kind domain tag, so two
//! record kinds can never produce the same hash and field boundaries are
//! unambiguous ("ab" + "c" differs from "a" + "bc").

use crate::ids::ContentHash;

/// Accumulates identity fields for one record kind.
pub struct IdentityHasher {
    inner: blake3::Hasher,
}

impl IdentityHasher {
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: blake3::Hasher::new(),
        };
        hasher.text(domain);
        hasher
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.inner.update(&(value.len() as u64).to_be_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub fn integer(&mut self, value: i64) -> &mut Self {
        self.inner.update(&value.to_be_bytes());
        self
    }

    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.inner.update(&[value as u8]);
        self
    }

    pub fn finish(&self) -> ContentHash {
        ContentHash::from_bytes(*self.inner.finalize().as_bytes())
    }
}

/// Implemented once per record kind. Only identity-bearing fields may be fed
/// to the hasher: never accessions, status flags or group links.
pub trait ContentHashed {
    const DOMAIN: &'static str;

    fn write_identity(&self, hasher: &mut IdentityHasher);

    fn content_hash(&self) -> ContentHash {
        let mut hasher = IdentityHasher::new(Self::DOMAIN);
        self.write_identity(&mut hasher);
        hasher.finish()
    }
}

/// Digest of an arbitrary byte payload, used for snapshot keys.
pub fn digest(bytes: &[u8]) -> ContentHash {
    ContentHash::from_bytes(*blake3::hash(bytes).as_bytes())
}
