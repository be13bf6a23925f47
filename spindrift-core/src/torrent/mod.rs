//! Torrent identity, job descriptors, and the session registry

pub mod descriptor;
pub mod registry;

use std::fmt;
use std::str::FromStr;

pub use descriptor::{RemoveOptions, TorrentDescriptor, DEFAULT_FILE_PRIORITY};
pub use registry::{TorrentHandle, TorrentRegistry, TorrentStatus};

/// SHA-1 info hash identifying a torrent (v1 identity).
///
/// 20-byte hash of the info dictionary. Older jobs carry only this
/// identity; hybrid jobs carry a [`Sha256Hash`] alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Hash([u8; 20]);

impl Sha1Hash {
    /// Creates a hash from 20 raw bytes.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Sha1Hash {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TorrentError::InvalidDescriptor {
            reason: format!("malformed sha-1 hex: {e}"),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| TorrentError::InvalidDescriptor {
                reason: "sha-1 hash must be 20 bytes".to_string(),
            })?;
        Ok(Self(hash))
    }
}

impl serde::Serialize for Sha1Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Sha1Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-256 info hash identifying a torrent (v2 identity).
///
/// 32-byte hash used by newer jobs, either alone or paired with a
/// [`Sha1Hash`] for hybrid identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash([u8; 32]);

impl Sha256Hash {
    /// Creates a hash from 32 raw bytes.
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Sha256Hash {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TorrentError::InvalidDescriptor {
            reason: format!("malformed sha-256 hex: {e}"),
        })?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TorrentError::InvalidDescriptor {
                reason: "sha-256 hash must be 32 bytes".to_string(),
            })?;
        Ok(Self(hash))
    }
}

impl serde::Serialize for Sha256Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Sha256Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Composite identity of a torrent: v1 hash, v2 hash, or both.
///
/// Derived equality and hashing are strict (field-wise); registry lookup
/// and deduplication use [`TorrentId::matches`], which treats a key
/// carrying fewer hashes as a subset of a key carrying more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TorrentId {
    pub v1: Option<Sha1Hash>,
    pub v2: Option<Sha256Hash>,
}

impl TorrentId {
    /// Identity carrying only a v1 hash.
    pub fn from_v1(v1: Sha1Hash) -> Self {
        Self {
            v1: Some(v1),
            v2: None,
        }
    }

    /// Identity carrying only a v2 hash.
    pub fn from_v2(v2: Sha256Hash) -> Self {
        Self {
            v1: None,
            v2: Some(v2),
        }
    }

    /// Hybrid identity carrying both hashes.
    pub fn both(v1: Sha1Hash, v2: Sha256Hash) -> Self {
        Self {
            v1: Some(v1),
            v2: Some(v2),
        }
    }

    /// Returns true if at least one hash is present.
    pub fn is_complete(&self) -> bool {
        self.v1.is_some() || self.v2.is_some()
    }

    /// Subset identity comparison: two keys match when every hash
    /// present in both is equal, and at least one hash is comparable.
    ///
    /// A v1-only key therefore matches a hybrid key with the same v1.
    /// This relation is not transitive, which is why it is not `PartialEq`.
    pub fn matches(&self, other: &TorrentId) -> bool {
        let v1_comparable = self.v1.is_some() && other.v1.is_some();
        let v2_comparable = self.v2.is_some() && other.v2.is_some();
        if !v1_comparable && !v2_comparable {
            return false;
        }
        if v1_comparable && self.v1 != other.v1 {
            return false;
        }
        if v2_comparable && self.v2 != other.v2 {
            return false;
        }
        true
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.v1, self.v2) {
            (Some(v1), _) => write!(f, "{v1}"),
            (None, Some(v2)) => write!(f, "{v2}"),
            (None, None) => f.write_str("(empty)"),
        }
    }
}

/// Behavior flags carried by a job descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TorrentFlags(u32);

impl TorrentFlags {
    /// Job starts paused; no announce or I/O until resumed.
    pub const PAUSED: TorrentFlags = TorrentFlags(1 << 0);
    /// Job is managed by the session scheduler.
    pub const AUTO_MANAGED: TorrentFlags = TorrentFlags(1 << 1);
    /// Pieces are requested in order.
    pub const SEQUENTIAL_DOWNLOAD: TorrentFlags = TorrentFlags(1 << 2);
    /// Job only uploads, never requests pieces.
    pub const UPLOAD_MODE: TorrentFlags = TorrentFlags(1 << 3);

    /// No flags set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Returns true if all bits of `other` are set in `self`.
    pub fn contains(&self, other: TorrentFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw bit representation.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for TorrentFlags {
    type Output = TorrentFlags;

    fn bitor(self, rhs: TorrentFlags) -> TorrentFlags {
        TorrentFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for TorrentFlags {
    fn bitor_assign(&mut self, rhs: TorrentFlags) {
        self.0 |= rhs.0;
    }
}

/// Lifecycle state of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    /// Registered but not yet started.
    Queued,
    /// Announced and participating in transfer.
    Active,
    /// Terminal failure; the job stays registered for inspection
    /// until explicitly removed.
    Error,
    /// Removal requested; the job disappears once the removal
    /// alert is posted.
    Removing,
}

impl fmt::Display for TorrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TorrentState::Queued => "queued",
            TorrentState::Active => "active",
            TorrentState::Error => "error",
            TorrentState::Removing => "removing",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during registry and session operations.
///
/// Adding a descriptor whose identity is already registered is not an
/// error: the add is idempotent and returns the existing handle.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("torrent {id} not found")]
    UnknownTorrent { id: TorrentId },

    #[error("unknown setting \"{name}\"")]
    UnknownSetting { name: String },

    #[error("identity conflict: {reason}")]
    IdentityConflict { reason: String },

    #[error("tracker connection failed: {url}")]
    TrackerConnectionFailed { url: String },

    #[error("session engine has shut down")]
    EngineShutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error")]
    UrlParsing(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1(byte: u8) -> Sha1Hash {
        Sha1Hash::new([byte; 20])
    }

    fn v2(byte: u8) -> Sha256Hash {
        Sha256Hash::new([byte; 32])
    }

    #[test]
    fn test_sha1_hash_hex_round_trip() {
        let hash = Sha1Hash::new([0xa0; 20]);
        assert_eq!(hash.to_string(), "a0".repeat(20));
        let parsed: Sha1Hash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_sha256_hash_hex_round_trip() {
        let hash = Sha256Hash::new([0xa0; 32]);
        assert_eq!(hash.to_string(), "a0".repeat(32));
        let parsed: Sha256Hash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_hash_parse_rejects_wrong_length() {
        assert!("abcd".parse::<Sha1Hash>().is_err());
        assert!("zz".repeat(20).parse::<Sha1Hash>().is_err());
        assert!("ab".repeat(20).parse::<Sha256Hash>().is_err());
    }

    #[test]
    fn test_subset_match_v1_only_against_hybrid() {
        let partial = TorrentId::from_v1(v1(1));
        let hybrid = TorrentId::both(v1(1), v2(2));
        assert!(partial.matches(&hybrid));
        assert!(hybrid.matches(&partial));
    }

    #[test]
    fn test_match_requires_comparable_hash() {
        let only_v1 = TorrentId::from_v1(v1(1));
        let only_v2 = TorrentId::from_v2(v2(2));
        assert!(!only_v1.matches(&only_v2));
    }

    #[test]
    fn test_match_rejects_conflicting_secondary() {
        let a = TorrentId::both(v1(1), v2(2));
        let b = TorrentId::both(v1(1), v2(3));
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_flags_bit_operations() {
        let flags = TorrentFlags::PAUSED | TorrentFlags::SEQUENTIAL_DOWNLOAD;
        assert!(flags.contains(TorrentFlags::PAUSED));
        assert!(!flags.contains(TorrentFlags::UPLOAD_MODE));
        assert_eq!(TorrentFlags::empty().bits(), 0);
    }
}
