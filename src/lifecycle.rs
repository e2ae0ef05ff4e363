//! A small generic state machine shared by collectors and the processor.
//!
//! Every subsystem in this crate moves through a linear sequence of named
//! states and needs to let other threads block until a particular state (or
//! later) is reached. This is that primitive, factored out once instead of
//! hand-rolled per subsystem.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A state that can be compared for "at least this far along" waits.
///
/// States are expected to be small linear enums; `rank` gives their order.
pub trait LifecycleState: Copy + PartialEq + std::fmt::Debug {
    fn rank(self) -> u8;
}

pub struct Lifecycle<S: LifecycleState> {
    state: Mutex<S>,
    changed: Condvar,
}

impl<S: LifecycleState> Lifecycle<S> {
    pub fn new(initial: S) -> Self {
        Lifecycle {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    pub fn set(&self, state: S) {
        let mut guard = self.state.lock();
        *guard = state;
        self.changed.notify_all();
    }

    pub fn get(&self) -> S {
        *self.state.lock()
    }

    pub fn is_at_least(&self, target: S) -> bool {
        self.state.lock().rank() >= target.rank()
    }

    /// Blocks until the state's rank reaches at least `target`'s, or
    /// `timeout` elapses. Returns whether the target was reached.
    pub fn wait_until(&self, target: S, timeout: Duration) -> bool {
        let mut guard = self.state.lock();
        if guard.rank() >= target.rank() {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return guard.rank() >= target.rank();
            }
            let result = self.changed.wait_for(&mut guard, deadline - now);
            if guard.rank() >= target.rank() {
                return true;
            }
            if result.timed_out() {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum TestState {
        Init,
        Running,
        Stopped,
    }

    impl LifecycleState for TestState {
        fn rank(self) -> u8 {
            match self {
                TestState::Init => 0,
                TestState::Running => 1,
                TestState::Stopped => 2,
            }
        }
    }

    #[test]
    fn wait_until_returns_immediately_if_already_there() {
        let lc = Lifecycle::new(TestState::Running);
        assert!(lc.wait_until(TestState::Init, Duration::from_millis(10)));
    }

    #[test]
    fn wait_until_times_out() {
        let lc = Lifecycle::new(TestState::Init);
        assert!(!lc.wait_until(TestState::Running, Duration::from_millis(20)));
    }

    #[test]
    fn wait_until_wakes_on_set() {
        let lc = Arc::new(Lifecycle::new(TestState::Init));
        let lc2 = Arc::clone(&lc);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            lc2.set(TestState::Running);
        });
        assert!(lc.wait_until(TestState::Running, Duration::from_secs(1)));
        handle.join().unwrap();
    }
}
