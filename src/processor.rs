//! The queue processor: drains the shared queue, folds metrics into the
//! shelf, and drives the periodic flush.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::destination::Destination;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::metric::parse_line;
use crate::queue::RequestQueue;
use crate::shelf::Shelf;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ProcessorState {
    Init,
    Configured,
    Processing,
    ShuttingDown,
    Stopped,
}

impl LifecycleState for ProcessorState {
    fn rank(self) -> u8 {
        match self {
            ProcessorState::Init => 0,
            ProcessorState::Configured => 1,
            ProcessorState::Processing => 2,
            ProcessorState::ShuttingDown => 3,
            ProcessorState::Stopped => 4,
        }
    }
}

type DestinationHandle = Arc<Mutex<Box<dyn Destination>>>;

enum ControlMsg {
    Shutdown,
}

fn wallclock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Owns the shelf and the destination list; drives the flush cycle.
///
/// `process()` blocks the calling thread for the processor's entire
/// lifetime: a `select!` between the incoming-work channel, a periodic
/// ticker, and a shutdown signal, rather than "drain, then sleep" which
/// would skew the flush cadence.
pub struct QueueProcessor {
    queue: RequestQueue,
    flush_interval: Duration,
    destinations: ArcSwap<Vec<DestinationHandle>>,
    shelf: Mutex<Shelf>,
    lifecycle: Arc<Lifecycle<ProcessorState>>,
    control_tx: Sender<ControlMsg>,
    control_rx: Receiver<ControlMsg>,
    parse_errors: AtomicU64,
    internal_stats: bool,
}

impl QueueProcessor {
    pub fn new(queue: RequestQueue, flush_interval: Duration) -> Self {
        Self::with_internal_stats(queue, flush_interval, false)
    }

    /// Same as [`QueueProcessor::new`], additionally folding
    /// `shelfd.queue_len`, `shelfd.parse_errors` and `shelfd.bad_lines_seen`
    /// into the shelf immediately before every flush.
    pub fn with_internal_stats(
        queue: RequestQueue,
        flush_interval: Duration,
        internal_stats: bool,
    ) -> Self {
        let (control_tx, control_rx) = channel::bounded(1);
        QueueProcessor {
            queue,
            flush_interval,
            destinations: ArcSwap::from_pointee(Vec::new()),
            shelf: Mutex::new(Shelf::new()),
            lifecycle: Arc::new(Lifecycle::new(ProcessorState::Configured)),
            control_tx,
            control_rx,
            parse_errors: AtomicU64::new(0),
            internal_stats,
        }
    }

    pub fn add_destination(&self, destination: Box<dyn Destination>) {
        let handle: DestinationHandle = Arc::new(Mutex::new(destination));
        self.destinations.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::clone(&handle));
            next
        });
    }

    pub fn clear_destinations(&self) {
        self.destinations.store(Arc::new(Vec::new()));
    }

    pub fn is_processing(&self) -> bool {
        self.lifecycle.get() == ProcessorState::Processing
    }

    pub fn wait_until_processing(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(ProcessorState::Processing, timeout)
    }

    pub fn wait_until_shutdown(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(ProcessorState::Stopped, timeout)
    }

    /// Requests termination. Returns immediately; the driver loop running
    /// inside `process()` performs the final drain-and-flush before
    /// transitioning to `Stopped`.
    pub fn shutdown(&self) {
        let _ = self.control_tx.send(ControlMsg::Shutdown);
    }

    fn fold_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        match parse_line(line) {
            Ok(metric) => self.shelf.lock().add(metric),
            Err(err) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                self.shelf.lock().record_parse_failure();
                debug!(%err, line, "dropping malformed metric line");
            }
        }
    }

    fn fold_request(&self, request: &str) {
        for line in request.split('\n') {
            self.fold_line(line);
        }
    }

    /// Snapshots the shelf and fans out to every destination in
    /// registration order. The shelf is cleared before any destination is
    /// attempted, so a destination failure never re-queues records.
    pub fn flush(&self) {
        let now = wallclock_seconds();
        let records = {
            let mut shelf = self.shelf.lock();
            let bad_lines = shelf.bad_lines_since_flush();
            if bad_lines > 0 {
                debug!(bad_lines, "dropped malformed lines since last flush");
            }
            if self.internal_stats {
                shelf.add(crate::metric::Metric::Gauge {
                    name: "shelfd.queue_len".to_string(),
                    value: self.queue.len() as f64,
                });
                shelf.add(crate::metric::Metric::Gauge {
                    name: "shelfd.parse_errors".to_string(),
                    value: self.parse_errors.load(Ordering::Relaxed) as f64,
                });
                shelf.add(crate::metric::Metric::Gauge {
                    name: "shelfd.bad_lines_seen".to_string(),
                    value: bad_lines as f64,
                });
            }
            shelf.snapshot_and_clear(now, self.flush_interval.as_secs_f64())
        };

        if records.is_empty() {
            return;
        }

        let destinations = self.destinations.load();
        for destination in destinations.iter() {
            let mut guard = destination.lock();
            if let Err(err) = guard.send(&records) {
                warn!(destination = guard.name(), error = %err, "destination flush failed");
            }
        }
    }

    /// Runs until `shutdown()` is called. Meant to be called on a
    /// dedicated thread by the server supervisor.
    pub fn process(&self) {
        self.lifecycle.set(ProcessorState::Processing);
        let ticker = channel::tick(self.flush_interval);
        let queue_rx = self.queue.receiver();

        loop {
            select! {
                recv(queue_rx) -> msg => {
                    if let Ok(request) = msg {
                        self.fold_request(&request);
                    }
                }
                recv(ticker) -> _ => {
                    self.flush();
                }
                recv(self.control_rx) -> _ => {
                    break;
                }
            }
        }

        self.lifecycle.set(ProcessorState::ShuttingDown);
        for request in self.queue.drain_available() {
            self.fold_request(&request);
        }
        self.flush();
        self.lifecycle.set(ProcessorState::Stopped);
    }
}
