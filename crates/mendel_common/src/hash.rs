//! Content hashing for change detection and tree digests.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;

/// Length in bytes of a [`SourceDigest`].
pub const DIGEST_LEN: usize = 20;

/// A 128-bit content hash computed using XXH3 for change detection.
///
/// Two sources with the same `ContentHash` are assumed to have identical
/// content. The cache compares hashes after a rebuild to log whether the
/// output actually moved. Clients are still sent the rebuilt entry because a
/// file change has already removed it on their side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A SHA-1 digest of a module's built source.
///
/// Tree hashes fold the digests of every module in a resolved tree into a
/// single 20-byte digest, so the layout has to stay SHA-1 sized for
/// previously issued hashes to keep resolving. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceDigest([u8; DIGEST_LEN]);

impl SourceDigest {
    /// Computes the SHA-1 digest of a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Folds a sequence of digests into one, in iteration order.
    pub fn combine<'a>(digests: impl IntoIterator<Item = &'a SourceDigest>) -> Self {
        let mut hasher = Sha1::new();
        for digest in digests {
            hasher.update(digest.0);
        }
        Self(hasher.finalize().into())
    }

    /// Wraps raw digest bytes.
    pub fn from_raw(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceDigest({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl Serialize for SourceDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SourceDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(de::Error::custom)?;
        let raw: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| de::Error::custom("digest must be 20 bytes"))?;
        Ok(Self(raw))
    }
}
