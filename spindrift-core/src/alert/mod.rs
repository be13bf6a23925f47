//! Alert taxonomy: categorized, immutable event records posted by the
//! session engine.

pub mod queue;

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

pub use queue::{AlertNotify, AlertQueue};

use crate::torrent::{TorrentId, TorrentState};

/// Bitmask over the fixed set of alert categories.
///
/// Consumers subscribe to a mask; alerts in unsubscribed categories are
/// never constructed. Status and error alerts are critical: the queue
/// refuses to drop them under backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AlertCategory(u32);

impl AlertCategory {
    /// Torrent lifecycle and tracker progress.
    pub const STATUS: AlertCategory = AlertCategory(1 << 0);
    /// Failures, synchronous or asynchronous.
    pub const ERROR: AlertCategory = AlertCategory(1 << 1);
    /// Degraded-but-working conditions, e.g. dropped alerts.
    pub const PERFORMANCE_WARNING: AlertCategory = AlertCategory(1 << 2);
    /// Periodic counter snapshots.
    pub const STATS: AlertCategory = AlertCategory(1 << 3);
    /// Peers connecting to the session's listen socket.
    pub const INCOMING_CONNECTION: AlertCategory = AlertCategory(1 << 4);

    /// Empty mask: nothing is constructed.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Every category.
    pub fn all() -> Self {
        Self::STATUS
            | Self::ERROR
            | Self::PERFORMANCE_WARNING
            | Self::STATS
            | Self::INCOMING_CONNECTION
    }

    /// Categories the queue never drops.
    pub fn critical() -> Self {
        Self::STATUS | Self::ERROR
    }

    /// Returns true if all bits of `other` are set in `self`.
    pub fn contains(&self, other: AlertCategory) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit is shared with `other`.
    pub fn intersects(&self, other: AlertCategory) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the raw bit representation.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Reconstructs a mask from raw bits, ignoring undefined bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits) & Self::all()
    }
}

impl std::ops::BitOr for AlertCategory {
    type Output = AlertCategory;

    fn bitor(self, rhs: AlertCategory) -> AlertCategory {
        AlertCategory(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for AlertCategory {
    type Output = AlertCategory;

    fn bitand(self, rhs: AlertCategory) -> AlertCategory {
        AlertCategory(self.0 & rhs.0)
    }
}

impl std::ops::BitOrAssign for AlertCategory {
    fn bitor_assign(&mut self, rhs: AlertCategory) {
        self.0 |= rhs.0;
    }
}

// Fixed name table; initialized once, never mutated.
const CATEGORY_NAMES: &[(AlertCategory, &str)] = &[
    (AlertCategory::STATUS, "status"),
    (AlertCategory::ERROR, "error"),
    (AlertCategory::PERFORMANCE_WARNING, "performance_warning"),
    (AlertCategory::STATS, "stats"),
    (AlertCategory::INCOMING_CONNECTION, "incoming_connection"),
];

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (category, name) in CATEGORY_NAMES {
            if self.intersects(*category) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

/// Named counters captured in a stats snapshot alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Registered jobs, including those pending removal.
    pub torrents_total: u64,
    /// Jobs currently in the active state.
    pub torrents_active: u64,
    /// Jobs parked in the terminal error state.
    pub torrents_errored: u64,
    /// Tracker announces completed successfully.
    pub announces_ok: u64,
    /// Tracker announces that failed.
    pub announces_failed: u64,
    /// Connections accepted on the listen socket.
    pub incoming_connections: u64,
    /// Alerts currently buffered in the queue.
    pub alerts_queued: u64,
    /// Alerts discarded under backpressure since startup.
    pub alerts_dropped: u64,
    /// Milliseconds since the engine started.
    pub uptime_ms: u64,
}

impl SessionCounters {
    /// The counters as a name/value mapping, in a fixed order.
    pub fn as_pairs(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("torrents.total", self.torrents_total),
            ("torrents.active", self.torrents_active),
            ("torrents.errored", self.torrents_errored),
            ("tracker.announces_ok", self.announces_ok),
            ("tracker.announces_failed", self.announces_failed),
            ("net.incoming_connections", self.incoming_connections),
            ("alerts.queued", self.alerts_queued),
            ("alerts.dropped", self.alerts_dropped),
            ("session.uptime_ms", self.uptime_ms),
        ]
    }
}

/// Event-specific payload of an alert.
///
/// Each kind maps to a fixed, non-empty category set.
#[derive(Debug, Clone)]
pub enum AlertKind {
    /// An add request completed; `existing` is set when the identity
    /// deduplicated against an already-registered job.
    TorrentAdded {
        id: TorrentId,
        name: String,
        existing: bool,
    },
    /// An asynchronous add request was rejected.
    AddFailed {
        id: Option<TorrentId>,
        reason: String,
    },
    /// A removal was confirmed; the identity no longer resolves.
    TorrentRemoved { id: TorrentId },
    /// A job moved between lifecycle states.
    StateChanged {
        id: TorrentId,
        previous: TorrentState,
        state: TorrentState,
    },
    /// A job failed and was parked in the error state.
    TorrentFailed { id: TorrentId, reason: String },
    /// A tracker answered an announce.
    TrackerReply {
        id: TorrentId,
        url: String,
        peers: usize,
    },
    /// A tracker announce failed.
    TrackerError {
        id: TorrentId,
        url: String,
        reason: String,
    },
    /// The listen socket could not be bound.
    ListenFailed { address: String, reason: String },
    /// A peer connected to the listen socket.
    IncomingConnection { address: SocketAddr },
    /// Periodic counter snapshot.
    StatsSnapshot { counters: SessionCounters },
    /// Alerts were discarded under backpressure since the last
    /// snapshot.
    AlertsDropped { count: u64 },
}

impl AlertKind {
    /// The fixed category set of this kind.
    pub fn category(&self) -> AlertCategory {
        match self {
            AlertKind::TorrentAdded { .. }
            | AlertKind::TorrentRemoved { .. }
            | AlertKind::StateChanged { .. }
            | AlertKind::TrackerReply { .. } => AlertCategory::STATUS,
            AlertKind::AddFailed { .. }
            | AlertKind::TorrentFailed { .. }
            | AlertKind::ListenFailed { .. } => AlertCategory::STATUS | AlertCategory::ERROR,
            AlertKind::TrackerError { .. } => AlertCategory::ERROR,
            AlertKind::IncomingConnection { .. } => AlertCategory::INCOMING_CONNECTION,
            AlertKind::StatsSnapshot { .. } => AlertCategory::STATS,
            AlertKind::AlertsDropped { .. } => AlertCategory::PERFORMANCE_WARNING,
        }
    }

    /// Machine-friendly discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            AlertKind::TorrentAdded { .. } => "torrent_added",
            AlertKind::AddFailed { .. } => "add_failed",
            AlertKind::TorrentRemoved { .. } => "torrent_removed",
            AlertKind::StateChanged { .. } => "state_changed",
            AlertKind::TorrentFailed { .. } => "torrent_failed",
            AlertKind::TrackerReply { .. } => "tracker_reply",
            AlertKind::TrackerError { .. } => "tracker_error",
            AlertKind::ListenFailed { .. } => "listen_failed",
            AlertKind::IncomingConnection { .. } => "incoming_connection",
            AlertKind::StatsSnapshot { .. } => "stats_snapshot",
            AlertKind::AlertsDropped { .. } => "alerts_dropped",
        }
    }
}

/// One immutable event record: what happened, when, and its category.
///
/// Constructed by the engine at the moment the underlying event occurs
/// and never mutated after enqueue.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Monotonic construction time; non-decreasing in delivery order.
    pub timestamp: Instant,
    pub kind: AlertKind,
}

impl Alert {
    /// Stamps a new alert with the current monotonic time.
    pub fn new(kind: AlertKind) -> Self {
        Self {
            timestamp: Instant::now(),
            kind,
        }
    }

    /// The fixed category set of the payload kind.
    pub fn category(&self) -> AlertCategory {
        self.kind.category()
    }

    /// Machine-friendly discriminator of the payload kind.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// True when the queue may discard this alert under backpressure.
    pub fn is_droppable(&self) -> bool {
        !self.category().intersects(AlertCategory::critical())
    }

    /// Human-readable one-line description.
    pub fn message(&self) -> String {
        match &self.kind {
            AlertKind::TorrentAdded { id, name, existing } => {
                if *existing {
                    format!("torrent {name} ({id}) already registered")
                } else {
                    format!("added torrent {name} ({id})")
                }
            }
            AlertKind::AddFailed { id, reason } => match id {
                Some(id) => format!("failed to add torrent {id}: {reason}"),
                None => format!("failed to add torrent: {reason}"),
            },
            AlertKind::TorrentRemoved { id } => format!("removed torrent {id}"),
            AlertKind::StateChanged {
                id,
                previous,
                state,
            } => format!("torrent {id}: {previous} -> {state}"),
            AlertKind::TorrentFailed { id, reason } => {
                format!("torrent {id} failed: {reason}")
            }
            AlertKind::TrackerReply { id, url, peers } => {
                format!("tracker {url} returned {peers} peers for {id}")
            }
            AlertKind::TrackerError { id, url, reason } => {
                format!("tracker {url} failed for {id}: {reason}")
            }
            AlertKind::ListenFailed { address, reason } => {
                format!("failed to listen on {address}: {reason}")
            }
            AlertKind::IncomingConnection { address } => {
                format!("incoming connection from {address}")
            }
            AlertKind::StatsSnapshot { counters } => {
                format!("session stats: {} torrents", counters.torrents_total)
            }
            AlertKind::AlertsDropped { count } => {
                format!("{count} alerts dropped under backpressure")
            }
        }
    }
}
