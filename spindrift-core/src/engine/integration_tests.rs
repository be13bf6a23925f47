//! Integration tests for the session engine's alert emission and
//! registry coupling.

use std::time::Duration;

use super::*;
use crate::alert::{Alert, AlertCategory, AlertKind};
use crate::config::SpindriftConfig;
use crate::settings::{ALERT_MASK, SettingsPack};
use crate::torrent::{
    RemoveOptions, Sha1Hash, Sha256Hash, TorrentDescriptor, TorrentId, TorrentState,
};

fn descriptor(byte: u8) -> TorrentDescriptor {
    TorrentDescriptor::from_v1(Sha1Hash::new([byte; 20]))
}

fn id_of(byte: u8) -> TorrentId {
    TorrentId::from_v1(Sha1Hash::new([byte; 20]))
}

/// Polls the queue until an alert satisfies the predicate or the
/// timeout elapses. Non-matching alerts drained along the way are
/// discarded.
async fn drain_until(
    handle: &SessionHandle,
    timeout: Duration,
    pred: impl Fn(&Alert) -> bool,
) -> Option<Alert> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        for alert in handle.pop_alerts() {
            if pred(&alert) {
                return Some(alert);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_add_emits_lifecycle_alerts_in_order() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    let result = handle.add_torrent(descriptor(0xaa)).await.unwrap();
    assert!(result.created);

    // Both alerts were pushed before the add responder fired, in
    // causal order: registered first, then activated.
    let alerts = handle.pop_alerts();
    let names: Vec<_> = alerts.iter().map(Alert::name).collect();
    let added_pos = names.iter().position(|n| *n == "torrent_added").unwrap();
    let state_pos = names.iter().position(|n| *n == "state_changed").unwrap();
    assert!(added_pos < state_pos);

    // Registry is read-consistent with the drained alert.
    assert!(handle.find_torrent(&id_of(0xaa)).is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_async_add_failure_surfaces_as_alert() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    handle
        .async_add_torrent(TorrentDescriptor::default())
        .await
        .unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "add_failed"
    })
    .await
    .expect("add_failed alert");
    assert!(alert.category().contains(AlertCategory::ERROR));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_async_duplicate_add_reports_existing() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    handle.add_torrent(descriptor(0xaa)).await.unwrap();
    handle.pop_alerts();

    // Same primary hash plus a secondary: subset dedup, reported via
    // an alert flagged as already-registered.
    let mut hybrid = descriptor(0xaa);
    hybrid.info_hash_v2 = Some(Sha256Hash::new([0xbb; 32]));
    handle.async_add_torrent(hybrid).await.unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "torrent_added"
    })
    .await
    .expect("torrent_added alert");
    match alert.kind {
        AlertKind::TorrentAdded { existing, id, .. } => {
            assert!(existing);
            // The stored identity was not upgraded by the add.
            assert_eq!(id.v2, None);
        }
        other => panic!("unexpected alert {}", other.name()),
    }
    assert_eq!(handle.torrents().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remove_is_confirmed_by_alert() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    let added = handle.add_torrent(descriptor(0xaa)).await.unwrap();
    handle.pop_alerts();

    handle
        .remove_torrent(&id_of(0xaa), RemoveOptions::default())
        .await
        .unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "torrent_removed"
    })
    .await
    .expect("torrent_removed alert");
    match alert.kind {
        AlertKind::TorrentRemoved { id } => assert_eq!(id, id_of(0xaa)),
        other => panic!("unexpected alert {}", other.name()),
    }

    // By the time the alert is drained, the identity no longer
    // resolves and outstanding handles have gone stale.
    assert!(handle.find_torrent(&id_of(0xaa)).is_none());
    assert!(!added.handle.is_valid());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_masked_categories_are_never_constructed() {
    let mut config = SpindriftConfig::for_testing();
    config.alerts.category_mask = AlertCategory::ERROR;
    let handle = spawn_session_engine(config, MockAnnouncer::new());

    handle.add_torrent(descriptor(0xaa)).await.unwrap();
    handle.post_stats().await.unwrap();
    // Round-trip a second command so the PostStats above has been
    // processed before we look at the queue.
    handle.apply_settings(SettingsPack::new()).await.unwrap();

    assert!(handle.pop_alerts().is_empty());

    // Widening the mask re-enables construction going forward.
    handle.set_alert_mask(AlertCategory::all());
    handle.add_torrent(descriptor(0xbb)).await.unwrap();
    assert!(
        handle
            .pop_alerts()
            .iter()
            .any(|alert| alert.name() == "torrent_added")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tracker_reply_alert_carries_peer_count() {
    let announcer =
        MockAnnouncer::with_peers(vec!["127.0.0.1:6881".parse().unwrap()]);
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), announcer);

    let mut torrent = descriptor(0xaa);
    torrent.trackers = vec!["udp://tracker.example.com:1337/announce".to_string()];
    handle.add_torrent(torrent).await.unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "tracker_reply"
    })
    .await
    .expect("tracker_reply alert");
    match alert.kind {
        AlertKind::TrackerReply { peers, .. } => assert_eq!(peers, 1),
        other => panic!("unexpected alert {}", other.name()),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tracker_failure_becomes_error_alert() {
    let handle = spawn_session_engine(
        SpindriftConfig::for_testing(),
        MockAnnouncer::new_with_announce_failure(),
    );

    let mut torrent = descriptor(0xaa);
    torrent.trackers = vec!["udp://tracker.example.com:1337/announce".to_string()];
    handle.add_torrent(torrent).await.unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "tracker_error"
    })
    .await
    .expect("tracker_error alert");
    assert!(alert.category().contains(AlertCategory::ERROR));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unusable_save_path_parks_job_in_error_state() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    // A regular file in the middle of the save path makes it
    // uncreatable.
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let mut torrent = descriptor(0xaa);
    torrent.name = Some("payload.bin".to_string());
    torrent.save_path = Some(blocker.path().join("downloads"));

    handle.add_torrent(torrent).await.unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "torrent_failed"
    })
    .await
    .expect("torrent_failed alert");
    assert!(alert.category().contains(AlertCategory::ERROR));

    // Exactly one failure alert; the job stays registered and
    // inspectable in the terminal error state.
    let found = handle.find_torrent(&id_of(0xaa)).unwrap();
    assert_eq!(found.status().unwrap().state, TorrentState::Error);
    assert!(
        !handle
            .pop_alerts()
            .iter()
            .any(|alert| alert.name() == "torrent_failed")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stats_snapshot_on_request() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    handle.add_torrent(descriptor(0xaa)).await.unwrap();
    handle.post_stats().await.unwrap();

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "stats_snapshot"
    })
    .await
    .expect("stats_snapshot alert");
    match alert.kind {
        AlertKind::StatsSnapshot { counters } => {
            assert_eq!(counters.torrents_total, 1);
            assert_eq!(counters.torrents_active, 1);
            assert!(
                counters
                    .as_pairs()
                    .iter()
                    .any(|(name, value)| *name == "torrents.total" && *value == 1)
            );
        }
        other => panic!("unexpected alert {}", other.name()),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_periodic_stats_tick_fires_without_request() {
    // for_testing uses a 50ms stats interval.
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "stats_snapshot"
    })
    .await;
    assert!(alert.is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_apply_settings_updates_alert_mask() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    let mut pack = SettingsPack::new();
    pack.set_int(ALERT_MASK, AlertCategory::STATS.bits() as i64)
        .unwrap();
    handle.apply_settings(pack).await.unwrap();
    assert_eq!(handle.alert_mask(), AlertCategory::STATS);

    // Status alerts are no longer constructed.
    handle.add_torrent(descriptor(0xaa)).await.unwrap();
    assert!(
        !handle
            .pop_alerts()
            .iter()
            .any(|alert| alert.name() == "torrent_added")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upgrade_identity_through_engine() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    handle.add_torrent(descriptor(0xaa)).await.unwrap();
    handle
        .upgrade_identity(&id_of(0xaa), Sha256Hash::new([0xbb; 32]))
        .await
        .unwrap();

    let by_v2 = TorrentId::from_v2(Sha256Hash::new([0xbb; 32]));
    assert!(handle.find_torrent(&by_v2).is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_incoming_connection_is_reported() {
    // Find a free port, release it, and hand it to the engine.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut config = SpindriftConfig::for_testing();
    config.network.listen_address = "127.0.0.1";
    config.network.listen_port = Some(port);
    let handle = spawn_session_engine(config, MockAnnouncer::new());

    // The listener comes up asynchronously; keep knocking until it
    // answers.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "listener never came up");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "incoming_connection"
    })
    .await
    .expect("incoming_connection alert");
    assert!(alert.category().contains(AlertCategory::INCOMING_CONNECTION));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_occupied_port_surfaces_listen_failed_alert() {
    // Hold the port so the engine's bind fails.
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut config = SpindriftConfig::for_testing();
    config.network.listen_address = "127.0.0.1";
    config.network.listen_port = Some(port);
    let handle = spawn_session_engine(config, MockAnnouncer::new());

    let alert = drain_until(&handle, Duration::from_secs(5), |alert| {
        alert.name() == "listen_failed"
    })
    .await
    .expect("listen_failed alert");
    assert!(alert.category().contains(AlertCategory::ERROR));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_paused_flag_skips_activation() {
    let handle = spawn_session_engine(SpindriftConfig::for_testing(), MockAnnouncer::new());

    let mut torrent = descriptor(0xaa);
    torrent.flags = crate::torrent::TorrentFlags::PAUSED;
    handle.add_torrent(torrent).await.unwrap();

    let found = handle.find_torrent(&id_of(0xaa)).unwrap();
    assert_eq!(found.status().unwrap().state, TorrentState::Queued);
    assert!(
        !handle
            .pop_alerts()
            .iter()
            .any(|alert| alert.name() == "state_changed")
    );

    handle.shutdown().await.unwrap();
}
