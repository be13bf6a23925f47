//! Command definitions for the session engine actor.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::settings::SettingsPack;
use crate::torrent::{
    RemoveOptions, Sha256Hash, TorrentDescriptor, TorrentError, TorrentHandle, TorrentId,
};
use crate::tracker::AnnounceResponse;

/// Result of a completed add request.
#[derive(Debug, Clone)]
pub struct AddTorrentResult {
    /// Handle to the registered (or pre-existing) entry.
    pub handle: TorrentHandle,
    /// True when a new entry was created; false when the identity
    /// deduplicated against an existing one.
    pub created: bool,
}

/// Commands processed by the session engine actor.
///
/// Each externally-issued command carries a response channel; the actor
/// processes commands sequentially, which keeps the registry and alert
/// queue causally consistent without shared-state locks on the engine
/// side. The variants without a responder arrive over the engine's
/// internal event channel.
pub enum EngineCommand {
    /// Register a job and report the outcome synchronously.
    AddTorrent {
        descriptor: TorrentDescriptor,
        responder: oneshot::Sender<Result<AddTorrentResult, TorrentError>>,
    },
    /// Register a job; completion is reported only through alerts.
    AsyncAddTorrent { descriptor: TorrentDescriptor },
    /// Schedule removal of a job. `Ok` means removal was scheduled;
    /// the job-removed alert confirms it.
    RemoveTorrent {
        id: TorrentId,
        options: RemoveOptions,
        responder: oneshot::Sender<Result<(), TorrentError>>,
    },
    /// Explicitly adopt a v2 hash onto a registered identity.
    UpgradeIdentity {
        id: TorrentId,
        v2: Sha256Hash,
        responder: oneshot::Sender<Result<(), TorrentError>>,
    },
    /// Post a stats snapshot alert outside the periodic schedule.
    PostStats,
    /// Apply a settings pack to the running session.
    ApplySettings {
        pack: SettingsPack,
        responder: oneshot::Sender<()>,
    },
    /// Shut down the engine actor gracefully.
    Shutdown { responder: oneshot::Sender<()> },

    /// Internal: second phase of a scheduled removal.
    FinishRemove { id: TorrentId },
    /// Internal: an announce task finished.
    AnnounceCompleted {
        id: TorrentId,
        url: String,
        result: Result<AnnounceResponse, TorrentError>,
    },
    /// Internal: the listen socket accepted a peer.
    PeerAccepted { address: SocketAddr },
    /// Internal: the listen socket could not be bound.
    ListenFailed { address: String, reason: String },
}
