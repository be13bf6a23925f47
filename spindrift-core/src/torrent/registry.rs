//! Identity-keyed table of active transfer jobs.
//!
//! The registry is mutated only by the session engine; consumers reach
//! it through read-only accessors on their own threads. All locks are
//! short-held so reads never stall the engine's hot path.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::RwLock;

use super::{
    Sha1Hash, Sha256Hash, TorrentDescriptor, TorrentError, TorrentId, TorrentState,
};

/// Point-in-time runtime status of a registered job.
///
/// Returned by value; mutating a copy has no effect on the live job.
#[derive(Debug, Clone)]
pub struct TorrentStatus {
    pub state: TorrentState,
    /// Completion fraction, 0.0 to 1.0.
    pub progress: f32,
    /// Last time a peer took data from this job.
    pub last_upload: Option<Instant>,
    /// Last time this job received payload data.
    pub last_download: Option<Instant>,
}

impl Default for TorrentStatus {
    fn default() -> Self {
        Self {
            state: TorrentState::Queued,
            progress: 0.0,
            last_upload: None,
            last_download: None,
        }
    }
}

/// Live registry entry for one job.
///
/// Exactly one entry exists per distinct identity. The identity can
/// only grow (an explicitly adopted v2 hash); the configuration
/// snapshot is immutable after registration.
pub(crate) struct TorrentEntry {
    key: u64,
    id: RwLock<TorrentId>,
    descriptor: TorrentDescriptor,
    status: RwLock<TorrentStatus>,
}

impl TorrentEntry {
    fn new(key: u64, descriptor: TorrentDescriptor) -> Self {
        Self {
            key,
            id: RwLock::new(descriptor.identity()),
            descriptor,
            status: RwLock::new(TorrentStatus::default()),
        }
    }

    pub(crate) fn id(&self) -> TorrentId {
        *self.id.read()
    }

    pub(crate) fn descriptor(&self) -> &TorrentDescriptor {
        &self.descriptor
    }

    pub(crate) fn status(&self) -> TorrentStatus {
        self.status.read().clone()
    }

    /// Sets the job state, returning the previous one.
    pub(crate) fn set_state(&self, state: TorrentState) -> TorrentState {
        std::mem::replace(&mut self.status.write().state, state)
    }
}

/// Stable reference to a registry entry.
///
/// Handles are cheap to clone and compare equal purely by identity:
/// any two handles addressing the same job are interchangeable, no
/// matter which call produced them. A handle outlives its entry; after
/// removal is confirmed it simply stops resolving.
#[derive(Clone)]
pub struct TorrentHandle {
    id: TorrentId,
    entry: Weak<TorrentEntry>,
}

impl TorrentHandle {
    fn new(entry: &Arc<TorrentEntry>) -> Self {
        Self {
            id: entry.id(),
            entry: Arc::downgrade(entry),
        }
    }

    /// The job's identity. Reflects an adopted secondary hash while the
    /// entry is alive; afterwards the identity seen at handle creation.
    pub fn id(&self) -> TorrentId {
        match self.entry.upgrade() {
            Some(entry) => entry.id(),
            None => self.id,
        }
    }

    /// True until the engine confirms removal of the entry.
    pub fn is_valid(&self) -> bool {
        self.entry.strong_count() > 0
    }

    /// Runtime status snapshot, or `None` once the entry is gone.
    pub fn status(&self) -> Option<TorrentStatus> {
        self.entry.upgrade().map(|entry| entry.status())
    }

    /// Copy of the configuration the job was registered with, or `None`
    /// once the entry is gone.
    pub fn descriptor(&self) -> Option<TorrentDescriptor> {
        self.entry.upgrade().map(|entry| entry.descriptor().clone())
    }

    /// Display name, falling back to the identity when the descriptor
    /// carried none.
    pub fn name(&self) -> String {
        self.descriptor()
            .and_then(|d| d.name)
            .unwrap_or_else(|| self.id().to_string())
    }

    /// Save path from the registered configuration.
    pub fn save_path(&self) -> Option<PathBuf> {
        self.descriptor().and_then(|d| d.save_path)
    }

    pub(crate) fn entry(&self) -> Option<Arc<TorrentEntry>> {
        self.entry.upgrade()
    }
}

impl PartialEq for TorrentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id().matches(&other.id())
    }
}

impl Eq for TorrentHandle {}

// Hashes the v1 hash when present, else the v2 hash. Handles that can
// compare equal always share their strongest common hash, because the
// registry deduplicates identities and only ever grows them.
impl Hash for TorrentHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let id = self.id();
        if let Some(v1) = id.v1 {
            v1.hash(state);
        } else if let Some(v2) = id.v2 {
            v2.hash(state);
        }
    }
}

impl std::fmt::Debug for TorrentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentHandle")
            .field("id", &self.id().to_string())
            .field("valid", &self.is_valid())
            .finish()
    }
}

struct RegistryInner {
    entries: HashMap<u64, Arc<TorrentEntry>>,
    by_v1: HashMap<Sha1Hash, u64>,
    by_v2: HashMap<Sha256Hash, u64>,
    next_key: u64,
}

/// Identity-keyed table of transfer jobs with subset-identity
/// deduplication.
///
/// Mutating calls are reserved for the session engine; `find` and
/// `list` are safe from any thread at any time.
pub struct TorrentRegistry {
    inner: RwLock<RegistryInner>,
}

impl TorrentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                by_v1: HashMap::new(),
                by_v2: HashMap::new(),
                next_key: 0,
            }),
        }
    }

    /// Registers a job, or returns the existing entry for an
    /// equal-or-subset identity.
    ///
    /// Returns the handle and whether a new entry was created. An
    /// idempotent re-add never alters the stored configuration, and a
    /// rejected add leaves no partial entry behind.
    ///
    /// # Errors
    /// - `TorrentError::InvalidDescriptor` - Descriptor fails
    ///   [`TorrentDescriptor::validate`]
    pub fn add(
        &self,
        descriptor: TorrentDescriptor,
    ) -> Result<(TorrentHandle, bool), TorrentError> {
        descriptor.validate()?;

        let mut inner = self.inner.write();

        // Dedup against either index: a later add carrying more hashes
        // resolves to the entry registered with fewer. The stored
        // identity wins; upgrades only happen through adopt_secondary.
        let existing = descriptor
            .info_hash
            .and_then(|v1| inner.by_v1.get(&v1))
            .or_else(|| {
                descriptor
                    .info_hash_v2
                    .and_then(|v2| inner.by_v2.get(&v2))
            })
            .copied();

        if let Some(key) = existing {
            let entry = &inner.entries[&key];
            tracing::debug!(id = %entry.id(), "add deduplicated against existing torrent");
            return Ok((TorrentHandle::new(entry), false));
        }

        let key = inner.next_key;
        inner.next_key += 1;

        let entry = Arc::new(TorrentEntry::new(key, descriptor));
        if let Some(v1) = entry.descriptor().info_hash {
            inner.by_v1.insert(v1, key);
        }
        if let Some(v2) = entry.descriptor().info_hash_v2 {
            inner.by_v2.insert(v2, key);
        }
        let handle = TorrentHandle::new(&entry);
        inner.entries.insert(key, entry);

        tracing::debug!(id = %handle.id(), "registered new torrent");
        Ok((handle, true))
    }

    /// Looks up a job by the subset-identity rule.
    ///
    /// Safe to call concurrently with `add` and removal.
    pub fn find(&self, id: &TorrentId) -> Option<TorrentHandle> {
        let inner = self.inner.read();
        Self::resolve(&inner, id).map(|key| TorrentHandle::new(&inner.entries[&key]))
    }

    /// Snapshot of all currently registered handles, in registration
    /// order. Mutations after the snapshot is taken are not reflected.
    pub fn list(&self) -> Vec<TorrentHandle> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner.entries.values().collect();
        entries.sort_by_key(|entry| entry.key);
        entries.into_iter().map(TorrentHandle::new).collect()
    }

    /// Number of registered jobs, including those pending removal.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True when no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First phase of removal: flags the entry as removing while it
    /// stays discoverable. The engine calls [`TorrentRegistry::unlink`]
    /// once the removal alert is about to be posted.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    pub(crate) fn mark_removing(&self, id: &TorrentId) -> Result<TorrentHandle, TorrentError> {
        let inner = self.inner.read();
        let key = Self::resolve(&inner, id).ok_or(TorrentError::UnknownTorrent { id: *id })?;
        let entry = &inner.entries[&key];
        entry.set_state(TorrentState::Removing);
        Ok(TorrentHandle::new(entry))
    }

    /// Second phase of removal: drops the entry and its index slots.
    /// Subsequent `find` calls for the identity return `None`.
    pub(crate) fn unlink(&self, id: &TorrentId) -> Option<TorrentId> {
        let mut inner = self.inner.write();
        let key = Self::resolve(&inner, id)?;
        let entry = inner.entries.remove(&key)?;
        let stored = entry.id();
        if let Some(v1) = stored.v1 {
            inner.by_v1.remove(&v1);
        }
        if let Some(v2) = stored.v2 {
            inner.by_v2.remove(&v2);
        }
        Some(stored)
    }

    /// Adopts a v2 hash onto an entry registered without one. This is
    /// the only way a stored identity changes; adds never upgrade.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    /// - `TorrentError::IdentityConflict` - The entry already carries a
    ///   different v2 hash, or the v2 hash belongs to another entry
    pub(crate) fn adopt_secondary(
        &self,
        id: &TorrentId,
        v2: Sha256Hash,
    ) -> Result<(), TorrentError> {
        let mut inner = self.inner.write();
        let key = Self::resolve(&inner, id).ok_or(TorrentError::UnknownTorrent { id: *id })?;

        let stored = inner.entries[&key].id();
        match stored.v2 {
            Some(current) if current == v2 => return Ok(()),
            Some(_) => {
                return Err(TorrentError::IdentityConflict {
                    reason: format!("torrent {stored} already carries a different v2 hash"),
                });
            }
            None => {}
        }

        if let Some(&other) = inner.by_v2.get(&v2) {
            if other != key {
                return Err(TorrentError::IdentityConflict {
                    reason: format!("v2 hash {v2} is registered to another torrent"),
                });
            }
        }

        inner.by_v2.insert(v2, key);
        inner.entries[&key].id.write().v2 = Some(v2);
        tracing::debug!(id = %inner.entries[&key].id(), "adopted v2 hash");
        Ok(())
    }

    // Strict subset-rule resolution: an index hit only counts when the
    // stored identity matches the query, so a query carrying a
    // conflicting second hash falls through to the other index.
    fn resolve(inner: &RegistryInner, id: &TorrentId) -> Option<u64> {
        if let Some(v1) = id.v1 {
            if let Some(&key) = inner.by_v1.get(&v1) {
                if inner.entries[&key].id().matches(id) {
                    return Some(key);
                }
            }
        }
        if let Some(v2) = id.v2 {
            if let Some(&key) = inner.by_v2.get(&v2) {
                if inner.entries[&key].id().matches(id) {
                    return Some(key);
                }
            }
        }
        None
    }
}

impl Default for TorrentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn v1(byte: u8) -> Sha1Hash {
        Sha1Hash::new([byte; 20])
    }

    fn v2(byte: u8) -> Sha256Hash {
        Sha256Hash::new([byte; 32])
    }

    #[test]
    fn test_idempotent_add() {
        let registry = TorrentRegistry::new();
        let descriptor = TorrentDescriptor::from_v1(v1(0xaa));

        let (first, created) = registry.add(descriptor.clone()).unwrap();
        assert!(created);
        let (second, created) = registry.add(descriptor).unwrap();
        assert!(!created);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subset_identity_dedup() {
        let registry = TorrentRegistry::new();
        let (_, created) = registry
            .add(TorrentDescriptor::from_v1(v1(0xaa)))
            .unwrap();
        assert!(created);

        // Same v1 plus a secondary hash resolves to the existing entry.
        let mut hybrid = TorrentDescriptor::from_v1(v1(0xaa));
        hybrid.info_hash_v2 = Some(v2(0xbb));
        let (handle, created) = registry.add(hybrid).unwrap();
        assert!(!created);

        // The stored identity was not upgraded by the add.
        assert_eq!(handle.id().v2, None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejected_add_leaves_no_entry() {
        let registry = TorrentRegistry::new();
        let mut descriptor = TorrentDescriptor::from_v1(v1(0xaa));
        descriptor.trackers = vec!["::not-a-url::".to_string()];

        assert!(registry.add(descriptor).is_err());
        assert!(registry.find(&TorrentId::from_v1(v1(0xaa))).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_by_partial_identity() {
        let registry = TorrentRegistry::new();
        let mut descriptor = TorrentDescriptor::from_v1(v1(0xaa));
        descriptor.info_hash_v2 = Some(v2(0xbb));
        registry.add(descriptor).unwrap();

        assert!(registry.find(&TorrentId::from_v1(v1(0xaa))).is_some());
        assert!(registry.find(&TorrentId::from_v2(v2(0xbb))).is_some());
        assert!(registry.find(&TorrentId::from_v1(v1(0xcc))).is_none());
    }

    #[test]
    fn test_find_rejects_conflicting_secondary() {
        let registry = TorrentRegistry::new();
        let mut descriptor = TorrentDescriptor::from_v1(v1(0xaa));
        descriptor.info_hash_v2 = Some(v2(0xbb));
        registry.add(descriptor).unwrap();

        let conflicting = TorrentId::both(v1(0xaa), v2(0xcc));
        assert!(registry.find(&conflicting).is_none());
    }

    #[test]
    fn test_two_phase_removal() {
        let registry = TorrentRegistry::new();
        let id = TorrentId::from_v1(v1(0xaa));
        let (handle, _) = registry.add(TorrentDescriptor::from_v1(v1(0xaa))).unwrap();

        registry.mark_removing(&id).unwrap();
        // Still discoverable between the request and the confirmation.
        let found = registry.find(&id).unwrap();
        assert_eq!(found.status().unwrap().state, TorrentState::Removing);

        registry.unlink(&id).unwrap();
        assert!(registry.find(&id).is_none());
        assert!(!handle.is_valid());
        assert!(handle.status().is_none());
    }

    #[test]
    fn test_remove_unknown_identity() {
        let registry = TorrentRegistry::new();
        let err = registry
            .mark_removing(&TorrentId::from_v1(v1(0xaa)))
            .unwrap_err();
        assert!(matches!(err, TorrentError::UnknownTorrent { .. }));
    }

    #[test]
    fn test_list_snapshot_isolation() {
        let registry = TorrentRegistry::new();
        registry.add(TorrentDescriptor::from_v1(v1(1))).unwrap();
        registry.add(TorrentDescriptor::from_v1(v1(2))).unwrap();

        let snapshot = registry.list();
        registry.add(TorrentDescriptor::from_v1(v1(3))).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let registry = TorrentRegistry::new();
        for byte in [5u8, 1, 9] {
            registry.add(TorrentDescriptor::from_v1(v1(byte))).unwrap();
        }

        let ids: Vec<_> = registry.list().iter().map(|h| h.id()).collect();
        assert_eq!(ids[0], TorrentId::from_v1(v1(5)));
        assert_eq!(ids[1], TorrentId::from_v1(v1(1)));
        assert_eq!(ids[2], TorrentId::from_v1(v1(9)));
    }

    #[test]
    fn test_adopt_secondary_upgrades_identity() {
        let registry = TorrentRegistry::new();
        let id = TorrentId::from_v1(v1(0xaa));
        let (handle, _) = registry.add(TorrentDescriptor::from_v1(v1(0xaa))).unwrap();

        registry.adopt_secondary(&id, v2(0xbb)).unwrap();
        assert_eq!(handle.id().v2, Some(v2(0xbb)));
        // The upgraded entry is now reachable through the v2 index.
        assert!(registry.find(&TorrentId::from_v2(v2(0xbb))).is_some());
        // Adopting the same hash again is a no-op.
        registry.adopt_secondary(&id, v2(0xbb)).unwrap();
    }

    #[test]
    fn test_adopt_secondary_conflicts() {
        let registry = TorrentRegistry::new();
        registry.add(TorrentDescriptor::from_v1(v1(0xaa))).unwrap();
        registry.add(TorrentDescriptor::from_v2(v2(0xbb))).unwrap();

        // The v2 hash already belongs to another entry.
        let err = registry
            .adopt_secondary(&TorrentId::from_v1(v1(0xaa)), v2(0xbb))
            .unwrap_err();
        assert!(matches!(err, TorrentError::IdentityConflict { .. }));

        // A different v2 adopts fine, after which it cannot be replaced.
        registry
            .adopt_secondary(&TorrentId::from_v1(v1(0xaa)), v2(0xcc))
            .unwrap();
        let err = registry
            .adopt_secondary(&TorrentId::from_v1(v1(0xaa)), v2(0xdd))
            .unwrap_err();
        assert!(matches!(err, TorrentError::IdentityConflict { .. }));
    }

    #[test]
    fn test_handles_interchangeable_in_sets() {
        let registry = TorrentRegistry::new();
        let (from_add, _) = registry.add(TorrentDescriptor::from_v1(v1(0xaa))).unwrap();
        let from_find = registry.find(&TorrentId::from_v1(v1(0xaa))).unwrap();

        let mut set = HashSet::new();
        set.insert(from_add);
        assert!(set.contains(&from_find));
        assert_eq!(set.len(), 1);
    }
}
