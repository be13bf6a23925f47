//! Mock implementations for testing the session engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::torrent::TorrentError;
use crate::tracker::{AnnounceRequest, AnnounceResponse, TrackerAnnouncer};

/// Mock tracker announcer for testing.
///
/// Answers every announce with a fixed peer list, or fails every
/// announce when constructed with `new_with_announce_failure`. The
/// announce counter can be cloned out before the announcer is moved
/// into the engine.
#[derive(Debug, Clone)]
pub struct MockAnnouncer {
    peers: Vec<SocketAddr>,
    fail_announces: bool,
    announces: Arc<AtomicUsize>,
}

impl MockAnnouncer {
    /// Creates a mock announcer that succeeds with an empty peer list.
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            fail_announces: false,
            announces: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a mock announcer that fails every announce.
    pub fn new_with_announce_failure() -> Self {
        Self {
            fail_announces: true,
            ..Self::new()
        }
    }

    /// Creates a mock announcer answering with the given peers.
    pub fn with_peers(peers: Vec<SocketAddr>) -> Self {
        Self {
            peers,
            ..Self::new()
        }
    }

    /// Shared announce counter; clone before handing the announcer to
    /// the engine.
    pub fn announce_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.announces)
    }
}

impl Default for MockAnnouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackerAnnouncer for MockAnnouncer {
    async fn announce(
        &self,
        url: &str,
        _request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError> {
        self.announces.fetch_add(1, Ordering::SeqCst);

        if self.fail_announces {
            return Err(TorrentError::TrackerConnectionFailed {
                url: url.to_string(),
            });
        }

        Ok(AnnounceResponse {
            interval: 1800,
            complete: 1,
            incomplete: self.peers.len() as u32,
            peers: self.peers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::{Sha1Hash, TorrentId};
    use crate::tracker::{AnnounceEvent, PeerId};

    fn request() -> AnnounceRequest {
        AnnounceRequest {
            id: TorrentId::from_v1(Sha1Hash::new([1; 20])),
            peer_id: PeerId::generate(),
            port: None,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::Started,
        }
    }

    #[tokio::test]
    async fn test_mock_answers_with_peers() {
        let peers: Vec<SocketAddr> = vec!["127.0.0.1:6881".parse().unwrap()];
        let announcer = MockAnnouncer::with_peers(peers.clone());
        let counter = announcer.announce_counter();

        let response = announcer
            .announce("http://tracker.example.com/announce", request())
            .await
            .unwrap();
        assert_eq!(response.peers, peers);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_mode() {
        let announcer = MockAnnouncer::new_with_announce_failure();
        let result = announcer
            .announce("http://tracker.example.com/announce", request())
            .await;
        assert!(matches!(
            result,
            Err(TorrentError::TrackerConnectionFailed { .. })
        ));
    }
}
