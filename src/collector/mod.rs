//! Collectors: network listeners that convert socket bytes into queued
//! raw-request strings.
//!
//! Both variants share the same state machine:
//! `Init -> Configured -> Binding -> Queuing -> ShuttingDown -> Stopped`.
//! Only `Configured -> Binding` can fail (a bind error); every later
//! transition reaches `Stopped` unconditionally on a shutdown request.

pub mod tcp;
pub mod udp;

use std::time::Duration;

use crate::lifecycle::LifecycleState;

/// How long an accept/read loop blocks before re-checking for a shutdown
/// request: small enough that `shutdown()` is observed promptly, large
/// enough not to spin the CPU.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a dynamically spawned TCP worker (above the initial pool size)
/// waits for a new connection before exiting.
pub const WORKER_IDLE_GRACE: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Init,
    Configured,
    Binding,
    Queuing,
    ShuttingDown,
    Stopped,
}

impl LifecycleState for CollectorState {
    fn rank(self) -> u8 {
        match self {
            CollectorState::Init => 0,
            CollectorState::Configured => 1,
            CollectorState::Binding => 2,
            CollectorState::Queuing => 3,
            CollectorState::ShuttingDown => 4,
            CollectorState::Stopped => 5,
        }
    }
}

/// Configuration shared by every collector variant.
///
/// `user`/`group` are carried here but acted on by the supervisor's
/// [`crate::privilege`] step, not by the collector itself — a collector only
/// needs to know its own bind address and queue handle.
#[derive(Clone, Debug)]
pub struct CollectorOptions {
    pub host: String,
    pub port: u16,
}

impl CollectorOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
