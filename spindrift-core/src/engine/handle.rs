//! Handle for communicating with the session engine actor.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::commands::{AddTorrentResult, EngineCommand};
use crate::alert::queue::AlertNotify;
use crate::alert::{Alert, AlertCategory, AlertQueue};
use crate::settings::SettingsPack;
use crate::torrent::{
    RemoveOptions, Sha256Hash, TorrentDescriptor, TorrentError, TorrentHandle, TorrentId,
    TorrentRegistry,
};

/// Handle for communicating with the session engine actor.
///
/// Mutations (add, remove, settings) are routed through the engine's
/// command channel and processed sequentially. Reads, meaning registry
/// lookups and everything on the alert queue, go straight to the shared
/// structures without an engine round trip and reflect the engine's
/// current, possibly in-flight, state. The handle can be cloned and
/// shared across threads safely.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<EngineCommand>,
    registry: Arc<TorrentRegistry>,
    alerts: Arc<AlertQueue>,
}

impl SessionHandle {
    /// Creates a new handle over the engine's channel and shared state.
    pub(crate) fn new(
        sender: mpsc::Sender<EngineCommand>,
        registry: Arc<TorrentRegistry>,
        alerts: Arc<AlertQueue>,
    ) -> Self {
        Self {
            sender,
            registry,
            alerts,
        }
    }

    /// Registers a job and waits for the outcome.
    ///
    /// Adding an already-registered identity (by the subset rule) is
    /// not an error: the existing handle comes back with
    /// `created = false` and the stored configuration untouched.
    ///
    /// # Errors
    /// - `TorrentError::InvalidDescriptor` - Malformed descriptor
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn add_torrent(
        &self,
        descriptor: TorrentDescriptor,
    ) -> Result<AddTorrentResult, TorrentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = EngineCommand::AddTorrent {
            descriptor,
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)?
    }

    /// Registers a job without waiting: completion, whether success or
    /// failure, is reported solely through alerts.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn async_add_torrent(
        &self,
        descriptor: TorrentDescriptor,
    ) -> Result<(), TorrentError> {
        self.sender
            .send(EngineCommand::AsyncAddTorrent { descriptor })
            .await
            .map_err(|_| TorrentError::EngineShutdown)
    }

    /// Schedules removal of a job.
    ///
    /// `Ok` means removal was scheduled: the entry stays discoverable
    /// (state `Removing`) until the job-removed alert confirms it, after
    /// which `find_torrent` for this identity returns `None`.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn remove_torrent(
        &self,
        id: &TorrentId,
        options: RemoveOptions,
    ) -> Result<(), TorrentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = EngineCommand::RemoveTorrent {
            id: *id,
            options,
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)?
    }

    /// Adopts a v2 hash onto a registered identity. The registry never
    /// upgrades identities on its own; this is the explicit path.
    ///
    /// # Errors
    /// - `TorrentError::UnknownTorrent` - No entry matches `id`
    /// - `TorrentError::IdentityConflict` - Hash taken or already set
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn upgrade_identity(
        &self,
        id: &TorrentId,
        v2: Sha256Hash,
    ) -> Result<(), TorrentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = EngineCommand::UpgradeIdentity {
            id: *id,
            v2,
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)?
    }

    /// Requests a stats snapshot alert outside the periodic schedule.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn post_stats(&self) -> Result<(), TorrentError> {
        self.sender
            .send(EngineCommand::PostStats)
            .await
            .map_err(|_| TorrentError::EngineShutdown)
    }

    /// Applies a settings pack to the running session and waits until
    /// the engine has taken it.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine actor is gone
    pub async fn apply_settings(&self, pack: SettingsPack) -> Result<(), TorrentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = EngineCommand::ApplySettings { pack, responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// Shuts down the engine actor gracefully.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine actor is already gone
    pub async fn shutdown(&self) -> Result<(), TorrentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = EngineCommand::Shutdown { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// Checks if the engine actor is still running.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Looks up a job by the subset-identity rule. Reads the live
    /// registry directly; no engine round trip.
    pub fn find_torrent(&self, id: &TorrentId) -> Option<TorrentHandle> {
        self.registry.find(id)
    }

    /// Point-in-time snapshot of all registered jobs, in registration
    /// order. Later mutations are not reflected in the snapshot.
    pub fn torrents(&self) -> Vec<TorrentHandle> {
        self.registry.list()
    }

    /// Removes and returns all pending alerts in delivery order.
    /// Never blocks.
    pub fn pop_alerts(&self) -> Vec<Alert> {
        self.alerts.drain()
    }

    /// Blocks the calling thread until an alert is pending or the
    /// timeout elapses; returns whether one is available.
    ///
    /// Meant for a dedicated consumer thread; do not call from async
    /// tasks, which should use [`SessionHandle::set_alert_notify`] or a
    /// signal endpoint instead.
    pub fn wait_for_alert(&self, timeout: Duration) -> bool {
        self.alerts.wait(timeout)
    }

    /// Registers (or clears) the empty-to-non-empty alert callback.
    /// The callback runs on the engine's thread and must be treated
    /// purely as a wake-up signal.
    pub fn set_alert_notify(&self, notify: Option<AlertNotify>) {
        self.alerts.set_notify(notify);
    }

    /// Registers (or clears) a pollable alert signal endpoint; one
    /// coalesced sentinel byte per empty-to-non-empty transition.
    pub fn set_alert_endpoint(&self, endpoint: Option<Box<dyn Write + Send>>) {
        self.alerts.set_signal_endpoint(endpoint);
    }

    /// The currently subscribed alert category mask.
    pub fn alert_mask(&self) -> AlertCategory {
        self.alerts.mask()
    }

    /// Changes which alert categories are constructed from now on.
    pub fn set_alert_mask(&self, mask: AlertCategory) {
        self.alerts.set_mask(mask);
    }
}
