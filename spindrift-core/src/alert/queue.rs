//! Bounded, category-aware alert channel between the engine and its
//! consumers.
//!
//! The engine side (`push`) never blocks and never fails: under
//! backpressure the queue sheds droppable alerts instead of stalling
//! protocol I/O. Consumers poll with `drain`, block with `wait`, or
//! register a notify callback / pollable signal endpoint.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Alert, AlertCategory};

/// Callback invoked when the queue transitions from empty to
/// non-empty. Runs on the engine's thread: it must not block and must
/// not call back into the queue.
pub type AlertNotify = Arc<dyn Fn() + Send + Sync>;

struct QueueInner {
    alerts: VecDeque<Alert>,
    notify: Option<AlertNotify>,
    endpoint: Option<Box<dyn Write + Send>>,
    // One unread sentinel byte is pending in the endpoint; further
    // transitions coalesce until the next drain.
    signal_armed: bool,
}

/// FIFO alert queue with a capacity bound and a category-aware drop
/// policy.
///
/// Critical alerts (status/error) are never discarded; when the queue
/// is full they evict the oldest droppable alert or, failing that,
/// overshoot the capacity bound. Droppable alerts (stats, performance
/// warnings, incoming connections) are shed oldest-first. Dropping
/// removes an alert entirely; the relative order of survivors is the
/// enqueue order.
pub struct AlertQueue {
    capacity: usize,
    mask: AtomicU32,
    dropped_total: AtomicU64,
    dropped_unreported: AtomicU64,
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl AlertQueue {
    /// Creates a queue with the given capacity and subscribed mask.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, mask: AlertCategory) -> Self {
        assert!(capacity > 0, "alert queue capacity must be positive");
        Self {
            capacity,
            mask: AtomicU32::new(mask.bits()),
            dropped_total: AtomicU64::new(0),
            dropped_unreported: AtomicU64::new(0),
            inner: Mutex::new(QueueInner {
                alerts: VecDeque::with_capacity(capacity),
                notify: None,
                endpoint: None,
                signal_armed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// The capacity the queue was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when the alert's category is enabled in the subscribed
    /// mask. The engine checks this before constructing an alert, so
    /// masked-out alerts are never built at all.
    pub fn should_post(&self, category: AlertCategory) -> bool {
        AlertCategory::from_bits(self.mask.load(Ordering::Relaxed)).intersects(category)
    }

    /// The currently subscribed category mask.
    pub fn mask(&self) -> AlertCategory {
        AlertCategory::from_bits(self.mask.load(Ordering::Relaxed))
    }

    /// Changes which categories are constructed from now on. Alerts
    /// already queued are not filtered retroactively.
    pub fn set_mask(&self, mask: AlertCategory) {
        self.mask.store(mask.bits(), Ordering::Relaxed);
    }

    /// Enqueues an alert. Engine-side only; never blocks, never fails.
    pub fn push(&self, alert: Alert) {
        let mut inner = self.inner.lock();
        let was_empty = inner.alerts.is_empty();

        if inner.alerts.len() >= self.capacity {
            let evicted = inner
                .alerts
                .iter()
                .position(|queued| queued.is_droppable());
            match (evicted, alert.is_droppable()) {
                (Some(pos), _) => {
                    let victim = inner.alerts.remove(pos);
                    self.record_drop(victim.as_ref());
                    inner.alerts.push_back(alert);
                }
                (None, true) => {
                    // Nothing droppable is buffered: shed the incoming
                    // alert rather than an already-queued critical one.
                    self.record_drop(Some(&alert));
                    return;
                }
                (None, false) => {
                    // Critical alerts are never dropped; overshoot the
                    // capacity bound instead.
                    inner.alerts.push_back(alert);
                }
            }
        } else {
            inner.alerts.push_back(alert);
        }

        if was_empty {
            Self::raise_signal(&mut inner);
            let notify = inner.notify.clone();
            drop(inner);
            self.cond.notify_all();
            if let Some(callback) = notify {
                callback();
            }
        }
    }

    /// Atomically removes and returns all queued alerts in FIFO order.
    /// Never blocks; an empty queue yields an empty vector. Re-arms the
    /// signal endpoint for the next empty-to-non-empty transition.
    pub fn drain(&self) -> Vec<Alert> {
        let mut inner = self.inner.lock();
        inner.signal_armed = false;
        inner.alerts.drain(..).collect()
    }

    /// Blocks the calling thread until an alert is pending or the
    /// timeout elapses; returns whether one is available.
    ///
    /// This is the only blocking consumer operation, intended for a
    /// dedicated control thread; cancellation is timeout-only. Multiple
    /// concurrent waiters are allowed; at least one wakes per
    /// transition, which one is unspecified.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.alerts.is_empty() {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return !inner.alerts.is_empty();
            }
        }
        true
    }

    /// Number of alerts currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().alerts.len()
    }

    /// True when no alerts are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers (or clears) the empty-to-non-empty callback.
    ///
    /// The callback runs on the engine's thread each time the queue
    /// goes from empty to non-empty, once per batch. Contract: treat it
    /// purely as a wake-up signal. It must not block and must not call
    /// back into the queue.
    pub fn set_notify(&self, notify: Option<AlertNotify>) {
        self.inner.lock().notify = notify;
    }

    /// Registers (or clears) a pollable signal endpoint.
    ///
    /// One sentinel byte is written per empty-to-non-empty transition,
    /// coalesced until the next `drain`, so a poll/select loop can
    /// multiplex alert readiness with other I/O. If alerts are already
    /// pending at registration time the byte is written immediately.
    pub fn set_signal_endpoint(&self, endpoint: Option<Box<dyn Write + Send>>) {
        let mut inner = self.inner.lock();
        inner.endpoint = endpoint;
        inner.signal_armed = false;
        if !inner.alerts.is_empty() {
            Self::raise_signal(&mut inner);
        }
    }

    /// Alerts discarded under backpressure since the last call; used by
    /// the engine to post the dropped-alerts performance warning.
    pub fn take_dropped(&self) -> u64 {
        self.dropped_unreported.swap(0, Ordering::Relaxed)
    }

    /// Alerts discarded under backpressure since the queue was built.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    fn record_drop(&self, alert: Option<&Alert>) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        self.dropped_unreported.fetch_add(1, Ordering::Relaxed);
        if let Some(alert) = alert {
            tracing::trace!(kind = alert.name(), "alert dropped under backpressure");
        }
    }

    fn raise_signal(inner: &mut QueueInner) {
        if inner.signal_armed {
            return;
        }
        if let Some(endpoint) = inner.endpoint.as_mut() {
            match endpoint.write_all(&[0]).and_then(|()| endpoint.flush()) {
                Ok(()) => inner.signal_armed = true,
                Err(e) => tracing::debug!("alert signal endpoint write failed: {e}"),
            }
        }
    }
}

impl std::fmt::Debug for AlertQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("mask", &self.mask())
            .finish()
    }
}
