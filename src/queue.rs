//! The shared raw-request queue: many collector producers, one processor consumer.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

/// A raw-request string pushed by a collector and drained by the processor.
#[derive(Clone)]
pub struct RequestQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl RequestQueue {
    /// An unbounded queue: enqueue never blocks.
    pub fn unbounded() -> Self {
        let (tx, rx) = channel::unbounded();
        RequestQueue { tx, rx }
    }

    /// A bounded queue: enqueue blocks the caller once `capacity` items are
    /// pending, giving the collector backpressure.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        RequestQueue { tx, rx }
    }

    /// Pushes a raw request. Blocks if the queue is bounded and full.
    ///
    /// Only fails if the processor side has been dropped, which does not
    /// happen while the server is running.
    pub fn push(&self, request: String) {
        let _ = self.tx.send(request);
    }

    /// A clone of the inner receiver, for callers (the processor driver)
    /// that need to `select!` over it alongside a ticker and a control
    /// channel rather than go through [`RequestQueue::recv_deadline`].
    pub fn receiver(&self) -> Receiver<String> {
        self.rx.clone()
    }

    /// Blocks until either an item is available or `deadline` elapses,
    /// returning `None` on timeout so the caller can run its flush branch.
    pub fn recv_deadline(&self, timeout: Duration) -> Option<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains everything currently queued without blocking, used during
    /// shutdown to fold remaining items before the final flush.
    pub fn drain_available(&self) -> Vec<String> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
