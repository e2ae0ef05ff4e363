//! OS signal handling: a dedicated thread that turns SIGHUP/SIGTERM/SIGINT
//! into typed [`ControlSignal`]s delivered to the supervisor over a
//! `crossbeam` channel — the same cross-thread messaging idiom the
//! processor uses for its own shutdown signal, generalized to three
//! external triggers instead of one internal one.

use crossbeam::channel::{self, Receiver};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::error::ShelfdError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    /// SIGHUP: re-read configuration and cycle collectors/destinations.
    Reload,
    /// SIGTERM / SIGINT: graceful shutdown.
    Stop,
}

/// Spawns the signal-handling thread and returns a receiver the
/// supervisor's control loop selects on.
///
/// Registration failure is fatal at startup, the same tier as a
/// collector bind failure.
pub fn spawn() -> Result<Receiver<ControlSignal>, ShelfdError> {
    let mut signals = Signals::new([SIGHUP, SIGTERM, SIGINT]).map_err(ShelfdError::Signals)?;
    let (tx, rx) = channel::unbounded();

    std::thread::Builder::new()
        .name("shelfd-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let control = match signal {
                    SIGHUP => ControlSignal::Reload,
                    SIGTERM | SIGINT => ControlSignal::Stop,
                    other => {
                        debug!(signal = other, "ignoring unexpected signal");
                        continue;
                    }
                };
                if tx.send(control).is_err() {
                    break;
                }
                if control == ControlSignal::Stop {
                    break;
                }
            }
        })
        .map_err(|err| ShelfdError::Signals(std::io::Error::other(err.to_string())))?;

    Ok(rx)
}
