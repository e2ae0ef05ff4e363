//! TCP collector: a listening socket served by a dynamic worker pool.
//!
//! The pool starts at `initial_workers` threads; when a connection arrives
//! and every worker is busy, a new worker is spun up as long as the pool is
//! below `max_workers`. At the limit, the accept loop stalls (backpressure)
//! until a worker frees. Workers spawned above the initial size exit after
//! [`super::WORKER_IDLE_GRACE`] of inactivity to reclaim threads after a
//! traffic burst subsides.

use std::io::{BufReader, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::CollectorError;
use crate::lifecycle::Lifecycle;
use crate::queue::RequestQueue;

use super::{CollectorOptions, CollectorState, POLL_INTERVAL, WORKER_IDLE_GRACE};

const READ_CHUNK: usize = 4096;

pub struct TcpCollector {
    options: CollectorOptions,
    queue: RequestQueue,
    initial_workers: usize,
    max_workers: usize,
    listener: Mutex<Option<TcpListener>>,
    lifecycle: Arc<Lifecycle<CollectorState>>,
    shutting_down: AtomicBool,
}

impl TcpCollector {
    pub fn new(
        options: CollectorOptions,
        queue: RequestQueue,
        initial_workers: usize,
        max_workers: usize,
    ) -> Self {
        TcpCollector {
            options,
            queue,
            initial_workers: initial_workers.max(1),
            max_workers: max_workers.max(initial_workers.max(1)),
            listener: Mutex::new(None),
            lifecycle: Arc::new(Lifecycle::new(CollectorState::Configured)),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> String {
        self.options.addr()
    }

    pub fn bind(&self) -> Result<(), CollectorError> {
        self.lifecycle.set(CollectorState::Binding);
        let addr = self.options.addr();
        let listener = TcpListener::bind(&addr).map_err(|source| CollectorError::Bind {
            kind: "tcp",
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true).map_err(CollectorError::Io)?;
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    pub fn is_queuing_requests(&self) -> bool {
        self.lifecycle.get() == CollectorState::Queuing
    }

    pub fn wait_until_queuing_requests(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(CollectorState::Queuing, timeout)
    }

    pub fn wait_until_shutdown(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(CollectorState::Stopped, timeout)
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Blocks accepting connections until `shutdown()` is called. Requires a
    /// prior successful `bind()`.
    pub fn serve(&self) -> Result<(), CollectorError> {
        let listener = {
            let guard = self.listener.lock();
            guard
                .as_ref()
                .expect("serve() called before bind()")
                .try_clone()
                .map_err(CollectorError::Io)?
        };

        let (tx, rx): (Sender<TcpStream>, Receiver<TcpStream>) = channel::unbounded();
        let active_workers = Arc::new(AtomicUsize::new(0));
        let busy_workers = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..self.initial_workers {
            handles.push(spawn_worker(
                rx.clone(),
                self.queue.clone(),
                Arc::clone(&active_workers),
                Arc::clone(&busy_workers),
                /* core */ true,
            ));
        }

        self.lifecycle.set(CollectorState::Queuing);
        debug!(addr = %self.options.addr(), "tcp collector queuing requests");

        while !self.shutting_down.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    self.ensure_capacity(&rx, &active_workers, &busy_workers, &mut handles);
                    let _ = tx.send(stream);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    debug!(addr = %self.options.addr(), error = %err, "tcp accept error, continuing");
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        self.lifecycle.set(CollectorState::ShuttingDown);
        drop(tx);
        for handle in handles {
            let _ = handle.join();
        }
        self.lifecycle.set(CollectorState::Stopped);
        Ok(())
    }

    /// Spins up another worker if the pool has room and every existing
    /// worker is currently busy; otherwise lets the caller's `accept()` sit
    /// in the OS backlog — that's the backpressure mechanism.
    fn ensure_capacity(
        &self,
        rx: &Receiver<TcpStream>,
        active_workers: &Arc<AtomicUsize>,
        busy_workers: &Arc<AtomicUsize>,
        handles: &mut Vec<thread::JoinHandle<()>>,
    ) {
        let active = active_workers.load(Ordering::SeqCst);
        let busy = busy_workers.load(Ordering::SeqCst);
        if busy < active {
            return;
        }
        if active >= self.max_workers {
            return;
        }
        handles.push(spawn_worker(
            rx.clone(),
            self.queue.clone(),
            Arc::clone(active_workers),
            Arc::clone(busy_workers),
            /* core */ false,
        ));
    }
}

impl Drop for TcpCollector {
    fn drop(&mut self) {
        if !self.shutting_down.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

fn spawn_worker(
    rx: Receiver<TcpStream>,
    queue: RequestQueue,
    active_workers: Arc<AtomicUsize>,
    busy_workers: Arc<AtomicUsize>,
    core: bool,
) -> thread::JoinHandle<()> {
    active_workers.fetch_add(1, Ordering::SeqCst);
    thread::spawn(move || {
        loop {
            let stream = if core {
                match rx.recv() {
                    Ok(stream) => stream,
                    Err(_) => break,
                }
            } else {
                match rx.recv_timeout(WORKER_IDLE_GRACE) {
                    Ok(stream) => stream,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            busy_workers.fetch_add(1, Ordering::SeqCst);
            handle_connection(stream, &queue);
            busy_workers.fetch_sub(1, Ordering::SeqCst);
        }
        active_workers.fetch_sub(1, Ordering::SeqCst);
    })
}

/// Reads lines from one connection until it closes, pushing each complete
/// line as its own raw request. A trailing partial line is discarded on
/// close, never folded.
fn handle_connection(stream: TcpStream, queue: &RequestQueue) {
    let mut reader = BufReader::new(stream);
    let mut pending = String::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]);
                pending.push_str(&text);
                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    let line = line.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        queue.push(line.to_string());
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn wait_for<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        pred()
    }

    #[test]
    fn complete_lines_are_queued_and_partial_line_is_buffered() {
        let queue = RequestQueue::unbounded();
        let options = CollectorOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let collector = Arc::new(TcpCollector::new(options, queue.clone(), 1, 2));
        collector.bind().unwrap();
        let bound_addr = {
            let guard = collector.listener.lock();
            guard.as_ref().unwrap().local_addr().unwrap()
        };

        let driver = Arc::clone(&collector);
        let handle = thread::spawn(move || driver.serve());
        collector.wait_until_queuing_requests(Duration::from_secs(1));

        let mut client = TcpStream::connect(bound_addr).unwrap();
        client.write_all(b"a:1|c\nb:2|c\npartia").unwrap();
        client.flush().unwrap();

        assert!(wait_for(|| queue.len() >= 2, Duration::from_secs(1)));
        let first = queue.recv_deadline(Duration::from_millis(200)).unwrap();
        let second = queue.recv_deadline(Duration::from_millis(200)).unwrap();
        assert_eq!(first, "a:1|c");
        assert_eq!(second, "b:2|c");

        client.write_all(b"l:3|c\n").unwrap();
        client.flush().unwrap();
        let third = queue.recv_deadline(Duration::from_secs(1)).unwrap();
        assert_eq!(third, "partial:3|c");

        drop(client);
        collector.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn worker_pool_grows_under_concurrent_connections() {
        let queue = RequestQueue::unbounded();
        let options = CollectorOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let collector = Arc::new(TcpCollector::new(options, queue, 1, 4));
        collector.bind().unwrap();
        let bound_addr = {
            let guard = collector.listener.lock();
            guard.as_ref().unwrap().local_addr().unwrap()
        };

        let driver = Arc::clone(&collector);
        let handle = thread::spawn(move || driver.serve());
        collector.wait_until_queuing_requests(Duration::from_secs(1));

        // Hold three connections open concurrently without sending a
        // newline, forcing the pool to grow past its initial size of 1.
        let mut clients = Vec::new();
        for _ in 0..3 {
            let mut client = TcpStream::connect(bound_addr).unwrap();
            client.write_all(b"holding").unwrap();
            client.flush().unwrap();
            clients.push(client);
        }

        thread::sleep(Duration::from_millis(200));

        for client in clients {
            drop(client);
        }

        collector.shutdown();
        handle.join().unwrap().unwrap();
    }
}
