//! Job descriptors consumed by the registry's add path.

use std::net::SocketAddr;
use std::path::PathBuf;

use url::Url;

use super::{Sha1Hash, Sha256Hash, TorrentError, TorrentFlags, TorrentId};

/// Priority applied to files and pieces not covered by an explicit
/// priority vector. 0 skips the file entirely, 7 is the highest.
pub const DEFAULT_FILE_PRIORITY: u8 = 4;

/// Highest priority value accepted in a priority vector.
pub const MAX_PRIORITY: u8 = 7;

/// Everything needed to register a transfer job with the session.
///
/// A descriptor produced from full file metadata carries a `name` and
/// must carry a `save_path`. A magnet-style descriptor carries neither:
/// it registers the identity and fills in the rest once metadata
/// arrives from the swarm.
///
/// Descriptors serialize cleanly so a session can persist its job list
/// and replay it at startup; replaying against a populated registry is
/// safe because adds are idempotent.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TorrentDescriptor {
    /// v1 (SHA-1) identity, if known.
    #[serde(default)]
    pub info_hash: Option<Sha1Hash>,
    /// v2 (SHA-256) identity, if known.
    #[serde(default)]
    pub info_hash_v2: Option<Sha256Hash>,
    /// Display name from parsed metadata; absent for magnet-style adds.
    #[serde(default)]
    pub name: Option<String>,
    /// Directory the job's payload is written beneath.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
    /// Per-file priorities; files beyond the vector get
    /// [`DEFAULT_FILE_PRIORITY`].
    #[serde(default)]
    pub file_priorities: Vec<u8>,
    /// Per-piece priorities; pieces beyond the vector get
    /// [`DEFAULT_FILE_PRIORITY`].
    #[serde(default)]
    pub piece_priorities: Vec<u8>,
    /// Tracker announce URLs, in tier order.
    #[serde(default)]
    pub trackers: Vec<String>,
    /// Known peers to seed the swarm with.
    #[serde(default)]
    pub peers: Vec<SocketAddr>,
    /// Behavior flags.
    #[serde(default)]
    pub flags: TorrentFlags,
}

impl TorrentDescriptor {
    /// Descriptor carrying only a v1 identity.
    pub fn from_v1(hash: Sha1Hash) -> Self {
        Self {
            info_hash: Some(hash),
            ..Default::default()
        }
    }

    /// Descriptor carrying only a v2 identity.
    pub fn from_v2(hash: Sha256Hash) -> Self {
        Self {
            info_hash_v2: Some(hash),
            ..Default::default()
        }
    }

    /// The composite identity this descriptor addresses.
    pub fn identity(&self) -> TorrentId {
        TorrentId {
            v1: self.info_hash,
            v2: self.info_hash_v2,
        }
    }

    /// True when the descriptor was not produced from full metadata.
    pub fn is_magnet(&self) -> bool {
        self.name.is_none()
    }

    /// Effective priority for `index`, applying the default where the
    /// vector is shorter than the job.
    pub fn file_priority(&self, index: usize) -> u8 {
        self.file_priorities
            .get(index)
            .copied()
            .unwrap_or(DEFAULT_FILE_PRIORITY)
    }

    /// Checks the descriptor is complete enough to register.
    ///
    /// # Errors
    /// - `TorrentError::InvalidDescriptor` - No identity hash at all, a
    ///   metadata descriptor without a save path, an out-of-range
    ///   priority value, or a tracker entry that is not a valid URL
    pub fn validate(&self) -> Result<(), TorrentError> {
        if self.info_hash.is_none() && self.info_hash_v2.is_none() {
            return Err(TorrentError::InvalidDescriptor {
                reason: "descriptor carries neither a v1 nor a v2 info hash".to_string(),
            });
        }

        if !self.is_magnet() && self.save_path.is_none() {
            return Err(TorrentError::InvalidDescriptor {
                reason: "metadata descriptor requires a save path".to_string(),
            });
        }

        for &priority in self.file_priorities.iter().chain(&self.piece_priorities) {
            if priority > MAX_PRIORITY {
                return Err(TorrentError::InvalidDescriptor {
                    reason: format!("priority {priority} exceeds maximum {MAX_PRIORITY}"),
                });
            }
        }

        for tracker in &self.trackers {
            Url::parse(tracker).map_err(|e| TorrentError::InvalidDescriptor {
                reason: format!("tracker \"{tracker}\" is not a valid URL: {e}"),
            })?;
        }

        Ok(())
    }
}

/// Options attached to a removal request.
///
/// `delete_files` is carried for the storage collaborator; the session
/// core itself never touches payload files.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub delete_files: bool,
}

impl RemoveOptions {
    /// Removal that also discards downloaded payload.
    pub fn with_files() -> Self {
        Self { delete_files: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_magnet_descriptor() -> TorrentDescriptor {
        TorrentDescriptor::from_v1(Sha1Hash::new([0xaa; 20]))
    }

    #[test]
    fn test_descriptor_without_identity_rejected() {
        let descriptor = TorrentDescriptor::default();
        let err = descriptor.validate().unwrap_err();
        assert!(matches!(err, TorrentError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_magnet_descriptor_needs_no_save_path() {
        assert!(valid_magnet_descriptor().validate().is_ok());
    }

    #[test]
    fn test_metadata_descriptor_requires_save_path() {
        let mut descriptor = valid_magnet_descriptor();
        descriptor.name = Some("archive.tar".to_string());
        assert!(descriptor.validate().is_err());

        descriptor.save_path = Some(PathBuf::from("/tmp/downloads"));
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_priority_range_checked() {
        let mut descriptor = valid_magnet_descriptor();
        descriptor.file_priorities = vec![0, 4, 7];
        assert!(descriptor.validate().is_ok());

        descriptor.file_priorities = vec![8];
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_tracker_urls_validated() {
        let mut descriptor = valid_magnet_descriptor();
        descriptor.trackers = vec!["udp://tracker.example.com:1337/announce".to_string()];
        assert!(descriptor.validate().is_ok());

        descriptor.trackers = vec!["not a url".to_string()];
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_default_priority_beyond_vector() {
        let mut descriptor = valid_magnet_descriptor();
        descriptor.file_priorities = vec![0, 1];
        assert_eq!(descriptor.file_priority(0), 0);
        assert_eq!(descriptor.file_priority(1), 1);
        assert_eq!(descriptor.file_priority(5), DEFAULT_FILE_PRIORITY);
    }

    #[test]
    fn test_descriptor_serde_round_trip() {
        let mut descriptor = valid_magnet_descriptor();
        descriptor.trackers = vec!["http://tracker.example.com/announce".to_string()];
        descriptor.flags = TorrentFlags::PAUSED | TorrentFlags::SEQUENTIAL_DOWNLOAD;

        let encoded = serde_json::to_string(&descriptor).unwrap();
        let decoded: TorrentDescriptor = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.identity(), descriptor.identity());
        assert_eq!(decoded.trackers, descriptor.trackers);
        assert_eq!(decoded.flags, descriptor.flags);
    }
}
