//! Tracker announce seam consumed by the session engine.
//!
//! Real tracker clients (HTTP/UDP) live outside this crate; the engine
//! only depends on the [`TrackerAnnouncer`] trait and posts alerts from
//! whatever it returns. [`crate::engine::MockAnnouncer`] implements it
//! for tests.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::torrent::{TorrentError, TorrentId};

/// Client identifier sent with every announce.
///
/// 20 bytes, client prefix followed by random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Creates a peer ID from raw bytes.
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Returns reference to the underlying 20 bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Generate a random peer ID for this client.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        // Spindrift client identifier prefix
        id[..8].copy_from_slice(b"-SD0001-");
        for byte in &mut id[8..] {
            *byte = rand::random();
        }
        Self(id)
    }
}

/// State change reported to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// Client started transferring this torrent
    Started,
    /// Client stopped transferring this torrent
    Stopped,
    /// Client completed this torrent
    Completed,
}

/// Announce request sent for one job.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Identity of the torrent being announced
    pub id: TorrentId,
    /// Client's unique identifier
    pub peer_id: PeerId,
    /// TCP port the client accepts peers on, if listening
    pub port: Option<u16>,
    /// Total bytes uploaded to other peers
    pub uploaded: u64,
    /// Total bytes downloaded from other peers
    pub downloaded: u64,
    /// Bytes remaining to download
    pub left: u64,
    /// Current client state for this torrent
    pub event: AnnounceEvent,
}

/// Tracker answer to an announce.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds until the next announce should be sent
    pub interval: u32,
    /// Number of seeders in the swarm
    pub complete: u32,
    /// Number of leechers in the swarm
    pub incomplete: u32,
    /// Peer addresses for connection attempts
    pub peers: Vec<SocketAddr>,
}

/// Announce-side tracker interface.
///
/// Implementations must be cheap to share; the engine announces from
/// spawned tasks and feeds the results back through its internal
/// channel.
#[async_trait]
pub trait TrackerAnnouncer: Send + Sync {
    /// Announces `request` to the tracker at `url`.
    ///
    /// # Errors
    /// Implementation-defined; the engine converts failures into
    /// tracker-error alerts rather than propagating them.
    async fn announce(
        &self,
        url: &str,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_has_client_prefix() {
        let peer_id = PeerId::generate();
        assert_eq!(&peer_id.as_bytes()[..8], b"-SD0001-");
    }

    #[test]
    fn test_generated_peer_ids_differ() {
        // 12 random bytes; a collision here means the RNG is broken.
        assert_ne!(PeerId::generate(), PeerId::generate());
    }
}
