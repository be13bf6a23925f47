//! Core session engine implementation for the actor model.

use std::fs::create_dir_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::commands::{AddTorrentResult, EngineCommand};
use crate::alert::{Alert, AlertCategory, AlertKind, AlertQueue, SessionCounters};
use crate::config::SpindriftConfig;
use crate::settings::SettingsPack;
use crate::torrent::{
    RemoveOptions, Sha256Hash, TorrentDescriptor, TorrentError, TorrentHandle, TorrentId,
    TorrentRegistry, TorrentState,
};
use crate::tracker::{AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerId, TrackerAnnouncer};

/// Core session engine running inside the actor.
///
/// Owns all registry mutation and all alert construction. Commands are
/// processed sequentially, so every mutation commits before its alert
/// is pushed and consumers always observe the two in causal order.
pub struct SessionEngine<A: TrackerAnnouncer> {
    config: SpindriftConfig,
    registry: Arc<TorrentRegistry>,
    alerts: Arc<AlertQueue>,
    announcer: Arc<A>,
    peer_id: PeerId,
    /// Channel for internal event notifications (deferred removals,
    /// announce results, accepted peers)
    internal_tx: mpsc::UnboundedSender<EngineCommand>,
    started_at: Instant,
    stats_interval: Duration,
    stats_interval_changed: bool,
    announces_ok: u64,
    announces_failed: u64,
    incoming_connections: u64,
}

impl<A: TrackerAnnouncer + 'static> SessionEngine<A> {
    /// Creates a new session engine around shared registry and queue.
    pub fn new(
        config: SpindriftConfig,
        announcer: A,
        registry: Arc<TorrentRegistry>,
        alerts: Arc<AlertQueue>,
        internal_tx: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        let stats_interval = config.session.stats_interval;
        Self {
            config,
            registry,
            alerts,
            announcer: Arc::new(announcer),
            peer_id: PeerId::generate(),
            internal_tx,
            started_at: Instant::now(),
            stats_interval,
            stats_interval_changed: false,
            announces_ok: 0,
            announces_failed: 0,
            incoming_connections: 0,
        }
    }

    /// Current interval between periodic stats snapshots.
    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    /// True once after the stats interval was changed by a settings
    /// pack; the actor loop re-arms its timer when it sees this.
    pub fn take_stats_interval_changed(&mut self) -> bool {
        std::mem::take(&mut self.stats_interval_changed)
    }

    /// Registers a job, or resolves to the existing entry for an
    /// equal-or-subset identity. Newly created jobs are started
    /// immediately unless their descriptor is flagged paused.
    ///
    /// # Errors
    /// - `TorrentError::InvalidDescriptor` - Malformed descriptor; no
    ///   partial entry is left behind
    pub fn add_torrent(
        &mut self,
        descriptor: TorrentDescriptor,
    ) -> Result<AddTorrentResult, TorrentError> {
        let (handle, created) = self.registry.add(descriptor)?;

        self.post_with(AlertCategory::STATUS, || AlertKind::TorrentAdded {
            id: handle.id(),
            name: handle.name(),
            existing: !created,
        });

        if created {
            self.start_torrent(&handle);
        }

        Ok(AddTorrentResult { handle, created })
    }

    /// Add path for fire-and-forget requests: failures become
    /// error-category alerts instead of returned errors.
    pub fn async_add_torrent(&mut self, descriptor: TorrentDescriptor) {
        let id = descriptor.identity();
        let id = id.is_complete().then_some(id);

        if let Err(e) = self.add_torrent(descriptor) {
            tracing::debug!("async add rejected: {e}");
            self.post_with(AlertCategory::STATUS | AlertCategory::ERROR, || {
                AlertKind::AddFailed {
                    id,
                    reason: e.to_string(),
                }
            });
        }
    }

    /// Schedules removal of a job. The entry stays discoverable (in the
    /// removing state) until the deferred second phase posts the
    /// job-removed alert.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    pub fn remove_torrent(
        &mut self,
        id: TorrentId,
        options: RemoveOptions,
    ) -> Result<(), TorrentError> {
        let handle = self.registry.mark_removing(&id)?;
        tracing::debug!(
            id = %handle.id(),
            delete_files = options.delete_files,
            "removal scheduled"
        );
        // Payload deletion belongs to the storage collaborator; the
        // flag is only recorded here.
        let _ = self.internal_tx.send(EngineCommand::FinishRemove { id: handle.id() });
        Ok(())
    }

    /// Second phase of removal: unlink the entry, then confirm with the
    /// job-removed alert. The unlink commits first, so by the time the
    /// alert is drained, `find` for this identity already misses.
    pub fn finish_remove(&mut self, id: TorrentId) {
        if let Some(stored) = self.registry.unlink(&id) {
            tracing::info!(id = %stored, "torrent removed");
            self.post_with(AlertCategory::STATUS, || AlertKind::TorrentRemoved {
                id: stored,
            });
        }
    }

    /// Explicit identity upgrade; adds never do this implicitly.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    /// - `TorrentError::IdentityConflict` - The v2 hash is taken or the
    ///   entry already carries a different one
    pub fn upgrade_identity(
        &mut self,
        id: TorrentId,
        v2: Sha256Hash,
    ) -> Result<(), TorrentError> {
        self.registry.adopt_secondary(&id, v2)
    }

    /// Feeds an announce result back into alerts and counters.
    pub fn announce_completed(
        &mut self,
        id: TorrentId,
        url: String,
        result: Result<AnnounceResponse, TorrentError>,
    ) {
        if self.registry.find(&id).is_none() {
            tracing::debug!(%id, "discarding announce result for removed torrent");
            return;
        }

        match result {
            Ok(response) => {
                self.announces_ok += 1;
                tracing::debug!(%id, url, peers = response.peers.len(), "announce ok");
                self.post_with(AlertCategory::STATUS, || AlertKind::TrackerReply {
                    id,
                    url,
                    peers: response.peers.len(),
                });
            }
            Err(e) => {
                self.announces_failed += 1;
                tracing::warn!(%id, url, "announce failed: {e}");
                self.post_with(AlertCategory::ERROR, || AlertKind::TrackerError {
                    id,
                    url,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Reports a peer accepted on the listen socket.
    pub fn peer_accepted(&mut self, address: SocketAddr) {
        self.incoming_connections += 1;
        self.post_with(AlertCategory::INCOMING_CONNECTION, || {
            AlertKind::IncomingConnection { address }
        });
    }

    /// Reports a listen socket that could not be bound.
    pub fn listen_failed(&mut self, address: String, reason: String) {
        tracing::error!("failed to listen on {address}: {reason}");
        self.post_with(AlertCategory::STATUS | AlertCategory::ERROR, || {
            AlertKind::ListenFailed { address, reason }
        });
    }

    /// Posts the periodic stats snapshot, preceded by a dropped-alerts
    /// warning when the queue shed anything since the last snapshot.
    pub fn post_stats(&mut self) {
        let dropped = self.alerts.take_dropped();
        if dropped > 0 {
            self.post_with(AlertCategory::PERFORMANCE_WARNING, || {
                AlertKind::AlertsDropped { count: dropped }
            });
        }

        self.post_with(AlertCategory::STATS, || AlertKind::StatsSnapshot {
            counters: self.snapshot_counters(),
        });
    }

    /// Applies a settings pack: the alert mask takes effect on the
    /// queue immediately, the stats interval re-arms the actor's timer.
    pub fn apply_settings(&mut self, pack: SettingsPack) {
        if let Some(mask) = pack.alert_mask() {
            tracing::info!(mask = %mask, "alert mask updated");
            self.alerts.set_mask(mask);
        }
        if let Some(interval) = pack.stats_interval() {
            self.stats_interval = interval;
            self.stats_interval_changed = true;
        }
        if let Some(capacity) = pack.alert_queue_size() {
            // Queue capacity is fixed at construction; remembered for
            // the next spawn only.
            tracing::info!(capacity, "alert queue size applies at next engine start");
        }
    }

    fn snapshot_counters(&self) -> SessionCounters {
        let mut active = 0;
        let mut errored = 0;
        for handle in self.registry.list() {
            match handle.status().map(|status| status.state) {
                Some(TorrentState::Active) => active += 1,
                Some(TorrentState::Error) => errored += 1,
                _ => {}
            }
        }

        SessionCounters {
            torrents_total: self.registry.len() as u64,
            torrents_active: active,
            torrents_errored: errored,
            announces_ok: self.announces_ok,
            announces_failed: self.announces_failed,
            incoming_connections: self.incoming_connections,
            alerts_queued: self.alerts.len() as u64,
            alerts_dropped: self.alerts.dropped_total(),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// Brings a newly registered job into service: verifies the save
    /// path, transitions it to active, and kicks off tracker announces.
    fn start_torrent(&mut self, handle: &TorrentHandle) {
        let Some(descriptor) = handle.descriptor() else {
            return;
        };

        if descriptor.flags.contains(crate::torrent::TorrentFlags::PAUSED) {
            tracing::debug!(id = %handle.id(), "torrent added paused");
            return;
        }

        if let Some(save_path) = &descriptor.save_path {
            if let Err(e) = create_dir_all(save_path) {
                self.fail_torrent(handle, format!("save path unusable: {e}"));
                return;
            }
        }

        if let Some(entry) = handle.entry() {
            let previous = entry.set_state(TorrentState::Active);
            self.post_with(AlertCategory::STATUS, || AlertKind::StateChanged {
                id: handle.id(),
                previous,
                state: TorrentState::Active,
            });
        }

        let id = handle.id();
        for url in &descriptor.trackers {
            self.spawn_announce(id, url.clone());
        }
    }

    /// Parks a job in the terminal error state. Exactly one error alert
    /// is posted; the entry stays registered for inspection until an
    /// explicit remove.
    fn fail_torrent(&mut self, handle: &TorrentHandle, reason: String) {
        tracing::warn!(id = %handle.id(), "torrent failed: {reason}");
        if let Some(entry) = handle.entry() {
            entry.set_state(TorrentState::Error);
        }
        self.post_with(AlertCategory::STATUS | AlertCategory::ERROR, || {
            AlertKind::TorrentFailed {
                id: handle.id(),
                reason,
            }
        });
    }

    fn spawn_announce(&self, id: TorrentId, url: String) {
        let announcer = Arc::clone(&self.announcer);
        let internal_tx = self.internal_tx.clone();
        let request = AnnounceRequest {
            id,
            peer_id: self.peer_id,
            port: self.config.network.listen_port,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::Started,
        };

        tokio::spawn(async move {
            let result = announcer.announce(&url, request).await;
            let _ = internal_tx.send(EngineCommand::AnnounceCompleted { id, url, result });
        });
    }

    // Alerts outside the subscribed mask are never constructed: the
    // closure only runs after the mask check. `category` must be the
    // category of the kind the closure builds.
    fn post_with(&self, category: AlertCategory, build: impl FnOnce() -> AlertKind) {
        if !self.alerts.should_post(category) {
            return;
        }
        let alert = Alert::new(build());
        debug_assert_eq!(alert.category(), category);
        self.alerts.push(alert);
    }
}
