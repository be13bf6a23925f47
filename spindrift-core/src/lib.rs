//! Spindrift Core - Alert delivery and torrent registry for a
//! peer-to-peer transfer session
//!
//! This crate provides the session core a transfer engine is built
//! around: the identity-keyed torrent registry, the categorized,
//! backpressure-aware alert queue, and the engine actor that owns them
//! both. Wire protocol, piece exchange, and storage layout are external
//! collaborators behind trait seams.

pub mod alert;
pub mod config;
pub mod engine;
pub mod settings;
pub mod torrent;
pub mod tracing_setup;
pub mod tracker;

// Re-export main types for convenient access
pub use alert::{Alert, AlertCategory, AlertKind, AlertQueue, SessionCounters};
pub use config::SpindriftConfig;
pub use engine::{AddTorrentResult, SessionHandle, spawn_session_engine};
pub use settings::SettingsPack;
pub use torrent::{
    Sha1Hash, Sha256Hash, TorrentDescriptor, TorrentError, TorrentHandle, TorrentId,
    TorrentRegistry, TorrentState,
};
pub use tracker::TrackerAnnouncer;
