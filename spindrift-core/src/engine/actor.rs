//! Actor implementation for the session engine.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::commands::EngineCommand;
use super::core::SessionEngine;
use super::handle::SessionHandle;
use crate::alert::AlertQueue;
use crate::config::SpindriftConfig;
use crate::torrent::TorrentRegistry;
use crate::tracker::TrackerAnnouncer;

/// Spawns the session engine actor and returns its handle.
///
/// Creates the registry and alert queue, wires up the configured
/// listen socket, and runs the engine as an actor in a separate task.
/// The actor processes commands sequentially, so registry mutations
/// and their alerts are always observed in causal order.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use spindrift_core::config::SpindriftConfig;
/// use spindrift_core::engine::{MockAnnouncer, spawn_session_engine};
///
/// let config = SpindriftConfig::default();
/// let handle = spawn_session_engine(config, MockAnnouncer::new());
/// # }
/// ```
pub fn spawn_session_engine<A>(config: SpindriftConfig, announcer: A) -> SessionHandle
where
    A: TrackerAnnouncer + 'static,
{
    let (sender, receiver) = mpsc::channel(config.session.command_queue_size);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let registry = Arc::new(TorrentRegistry::new());
    let alerts = Arc::new(AlertQueue::new(
        config.alerts.queue_capacity,
        config.alerts.category_mask,
    ));

    if let Some(port) = config.network.listen_port {
        spawn_listener(config.network.listen_address, port, internal_tx.clone());
    }

    let engine = SessionEngine::new(
        config,
        announcer,
        Arc::clone(&registry),
        Arc::clone(&alerts),
        internal_tx,
    );

    tokio::spawn(async move {
        run_actor_loop(engine, receiver, internal_rx).await;
    });

    SessionHandle::new(sender, registry, alerts)
}

/// Runs the main actor message processing loop.
///
/// Commands from the public handle and internal events (deferred
/// removals, announce results, accepted peers) are interleaved with the
/// periodic stats tick. The loop continues until the command channel is
/// closed or a shutdown command is received.
async fn run_actor_loop<A>(
    mut engine: SessionEngine<A>,
    mut receiver: mpsc::Receiver<EngineCommand>,
    mut internal_rx: mpsc::UnboundedReceiver<EngineCommand>,
) where
    A: TrackerAnnouncer + 'static,
{
    tracing::debug!("session engine actor started");

    let mut stats_timer = new_stats_timer(engine.stats_interval());

    loop {
        tokio::select! {
            Some(command) = receiver.recv() => {
                if !handle_command(&mut engine, command) {
                    break;
                }
                if engine.take_stats_interval_changed() {
                    stats_timer = new_stats_timer(engine.stats_interval());
                }
            }
            Some(command) = internal_rx.recv() => {
                if !handle_command(&mut engine, command) {
                    break;
                }
            }
            _ = stats_timer.tick() => {
                engine.post_stats();
            }
            else => break,
        }
    }

    tracing::debug!("session engine actor stopped");
}

// First tick only after a full period, not immediately at startup.
fn new_stats_timer(period: std::time::Duration) -> tokio::time::Interval {
    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
}

/// Handles a single command for the session engine.
/// Returns true to continue processing, false to shutdown.
fn handle_command<A>(engine: &mut SessionEngine<A>, command: EngineCommand) -> bool
where
    A: TrackerAnnouncer + 'static,
{
    match command {
        EngineCommand::AddTorrent {
            descriptor,
            responder,
        } => {
            let result = engine.add_torrent(descriptor);
            let _ = responder.send(result);
        }

        EngineCommand::AsyncAddTorrent { descriptor } => {
            engine.async_add_torrent(descriptor);
        }

        EngineCommand::RemoveTorrent {
            id,
            options,
            responder,
        } => {
            let result = engine.remove_torrent(id, options);
            let _ = responder.send(result);
        }

        EngineCommand::UpgradeIdentity { id, v2, responder } => {
            let result = engine.upgrade_identity(id, v2);
            let _ = responder.send(result);
        }

        EngineCommand::PostStats => {
            engine.post_stats();
        }

        EngineCommand::ApplySettings { pack, responder } => {
            engine.apply_settings(pack);
            let _ = responder.send(());
        }

        EngineCommand::Shutdown { responder } => {
            tracing::debug!("session engine actor shutting down");
            let _ = responder.send(());
            return false; // Signal to break out of the loop
        }

        EngineCommand::FinishRemove { id } => {
            engine.finish_remove(id);
        }

        EngineCommand::AnnounceCompleted { id, url, result } => {
            engine.announce_completed(id, url, result);
        }

        EngineCommand::PeerAccepted { address } => {
            engine.peer_accepted(address);
        }

        EngineCommand::ListenFailed { address, reason } => {
            engine.listen_failed(address, reason);
        }
    }
    true // Continue processing
}

/// Accepts peer connections and reports them to the engine.
///
/// The session core only observes connections; protocol hand-off is an
/// external collaborator's job, so accepted sockets are closed after
/// being reported.
fn spawn_listener(
    address: &'static str,
    port: u16,
    internal_tx: mpsc::UnboundedSender<EngineCommand>,
) {
    tokio::spawn(async move {
        let listener = match TcpListener::bind((address, port)).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = internal_tx.send(EngineCommand::ListenFailed {
                    address: format!("{address}:{port}"),
                    reason: e.to_string(),
                });
                return;
            }
        };

        tracing::info!("accepting peer connections on {address}:{port}");
        loop {
            match listener.accept().await {
                Ok((_stream, peer)) => {
                    if internal_tx
                        .send(EngineCommand::PeerAccepted { address: peer })
                        .is_err()
                    {
                        break; // Engine is gone
                    }
                }
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                }
            }
        }
    });
}
