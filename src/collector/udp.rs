//! UDP collector: one datagram socket, no per-client state.
//!
//! Each datagram is a self-contained raw request: any partial trailing
//! line in a datagram is simply whatever bytes arrived, so no buffering
//! across reads is needed the way the TCP collector needs it.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::CollectorError;
use crate::lifecycle::Lifecycle;
use crate::queue::RequestQueue;

use super::{CollectorOptions, CollectorState, POLL_INTERVAL};

/// Maximum UDP datagram read size: one datagram is at most 64 KiB.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

pub struct UdpCollector {
    options: CollectorOptions,
    queue: RequestQueue,
    socket: Mutex<Option<UdpSocket>>,
    lifecycle: Arc<Lifecycle<CollectorState>>,
    shutting_down: AtomicBool,
}

impl UdpCollector {
    pub fn new(options: CollectorOptions, queue: RequestQueue) -> Self {
        UdpCollector {
            options,
            queue,
            socket: Mutex::new(None),
            lifecycle: Arc::new(Lifecycle::new(CollectorState::Configured)),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> String {
        self.options.addr()
    }

    /// Binds the datagram socket. Must succeed before `serve()` is called;
    /// a bind failure here is fatal at startup.
    pub fn bind(&self) -> Result<(), CollectorError> {
        self.lifecycle.set(CollectorState::Binding);
        let addr = self.options.addr();
        let socket = UdpSocket::bind(&addr).map_err(|source| CollectorError::Bind {
            kind: "udp",
            addr: addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(CollectorError::Io)?;
        *self.socket.lock() = Some(socket);
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

    /// Blocks reading datagrams until `shutdown()` is called. Requires a
    /// prior successful `bind()`.
    pub fn serve(&self) -> Result<(), CollectorError> {
        let socket = {
            let guard = self.socket.lock();
            guard
                .as_ref()
                .expect("serve() called before bind()")
                .try_clone()
                .map_err(CollectorError::Io)?
        };

        self.lifecycle.set(CollectorState::Queuing);
        debug!(addr = %self.options.addr(), "udp collector queuing requests");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        while !self.shutting_down.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf) {
                Ok((n, _peer)) => {
                    if n == 0 {
                        continue;
                    }
                    let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                    self.queue.push(request);
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => {
                    debug!(addr = %self.options.addr(), error = %err, "udp read error, continuing");
                    continue;
                }
            }
        }

        self.lifecycle.set(CollectorState::ShuttingDown);
        self.lifecycle.set(CollectorState::Stopped);
        Ok(())
    }
}

impl Drop for UdpCollector {
    fn drop(&mut self) {
        if !self.shutting_down.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}
