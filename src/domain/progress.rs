//! Aggregated run progress.
//!
//! A run is split into units: one per extracted segment plus one for the
//! final concat. The visible percentage is
//! `round(100 * (completed + fraction) / total)`, where `fraction` is how far
//! the currently running stage has got.
//!
//! The orchestrator and the callback listener both write here from different
//! tasks. All state sits behind one lock, and subscribers are fed from their
//! own delivery threads so a slow observer never stalls either writer.

use futures::executor::block_on;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::plan::PipelinePlan;
use crate::error::Result;

/// Point-in-time view of the model, handed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub completed_units: usize,
    pub total_units: usize,
    pub fraction: f64,
    /// Strictly increases with every mutation.
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug)]
struct ProgressState {
    total_units: usize,
    completed_units: usize,
    current_fraction: f64,
    sequence: u64,
}

impl ProgressState {
    fn percent(&self) -> u8 {
        let done = self.completed_units as f64 + self.current_fraction;
        let percent = (done * 100.0 / self.total_units as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent(),
            completed_units: self.completed_units,
            total_units: self.total_units,
            fraction: self.current_fraction,
            sequence: self.sequence,
        }
    }
}

pub struct ProgressModel {
    state: Mutex<ProgressState>,
    subscribers: Mutex<HashMap<SubscriptionId, watch::Sender<ProgressSnapshot>>>,
    next_id: AtomicU64,
}

impl ProgressModel {
    pub fn new(total_units: usize) -> Self {
        let total_units = total_units.max(1);
        debug!(total_units, "Progress model created");

        Self {
            state: Mutex::new(ProgressState {
                total_units,
                completed_units: 0,
                current_fraction: 0.0,
                sequence: 0,
            }),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// One unit per segment, plus one for the concat.
    pub fn for_plan(plan: &PipelinePlan) -> Self {
        Self::new(plan.total_units())
    }

    /// Set how far the running stage has got. Reports from the transcoder can
    /// overshoot, so the value is clamped to `[0, 1]` rather than rejected.
    pub fn add_fraction(&self, fraction: f64) {
        let snapshot = {
            let mut state = self.state.lock();
            let headroom = (state.total_units - state.completed_units) as f64;
            let clamped = if fraction.is_nan() {
                0.0
            } else {
                fraction.clamp(0.0, 1.0_f64.min(headroom))
            };
            state.current_fraction = clamped;
            state.sequence += 1;
            trace!(fraction, clamped, percent = state.percent(), "Stage fraction updated");
            state.snapshot()
        };
        self.publish(snapshot);
    }

    /// Count the running stage as done and start the next one from zero.
    pub fn stage_completed(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.completed_units < state.total_units {
                state.completed_units += 1;
            } else {
                warn!(
                    total_units = state.total_units,
                    "Stage completed after every unit was already done"
                );
            }
            state.current_fraction = 0.0;
            state.sequence += 1;
            debug!(
                completed = state.completed_units,
                total = state.total_units,
                percent = state.percent(),
                "Stage completed"
            );
            state.snapshot()
        };
        self.publish(snapshot);
    }

    pub fn current_percent(&self) -> u8 {
        self.state.lock().percent()
    }

    pub fn completed_units(&self) -> usize {
        self.state.lock().completed_units
    }

    pub fn current_fraction(&self) -> f64 {
        self.state.lock().current_fraction
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().snapshot()
    }

    /// Register a listener. It is called with the current snapshot right
    /// away, then after every change, on a delivery thread of its own.
    ///
    /// Intermediate snapshots may be skipped when the listener falls behind,
    /// but it never sees an older snapshot after a newer one.
    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriptionId>
    where
        F: Fn(ProgressSnapshot) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        // Registry lock first, so a concurrent publish either sees this
        // subscriber or has already been folded into the initial snapshot.
        let mut subscribers = self.subscribers.lock();
        let (tx, mut rx) = watch::channel(self.snapshot());

        thread::Builder::new()
            .name(format!("progress-delivery-{}", id.0))
            .spawn(move || loop {
                let snapshot = *rx.borrow_and_update();
                listener(snapshot);
                if block_on(rx.changed()).is_err() {
                    break;
                }
            })?;

        subscribers.insert(id, tx);
        debug!(subscription = id.0, "Progress listener added");
        Ok(id)
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscription = id.0, "Progress listener removed");
        }
        removed
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        let subscribers = self.subscribers.lock();
        for tx in subscribers.values() {
            tx.send_if_modified(|pending| {
                if snapshot.sequence > pending.sequence {
                    *pending = snapshot;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl std::fmt::Debug for ProgressModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressModel")
            .field("state", &*self.state.lock())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
