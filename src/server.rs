//! The server supervisor: wires the queue, processor, and collectors
//! together and owns their lifecycle.
//!
//! Startup order: queue -> processor (wait for `Processing`) -> collectors
//! (wait for `Queuing` each). Shutdown order: collectors -> processor
//! (final drain-and-flush) -> queue released. Reload stops and restarts
//! only the collectors and swaps destinations; the processor and its shelf
//! are never touched, so accumulated state and `last_flush` survive a
//! reload untouched.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::collector::tcp::TcpCollector;
use crate::collector::udp::UdpCollector;
use crate::collector::CollectorOptions;
use crate::config::ServerConfig;
use crate::error::{CollectorError, ShelfdError};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::privilege;
use crate::processor::QueueProcessor;
use crate::queue::RequestQueue;
use crate::signals::ControlSignal;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerState {
    Init,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState for ServerState {
    fn rank(self) -> u8 {
        match self {
            ServerState::Init => 0,
            ServerState::Starting => 1,
            ServerState::Running => 2,
            ServerState::ShuttingDown => 3,
            ServerState::Stopped => 4,
        }
    }
}

struct RunningCollectors {
    udp: Vec<Arc<UdpCollector>>,
    tcp: Vec<Arc<TcpCollector>>,
    handles: Vec<std::thread::JoinHandle<Result<(), CollectorError>>>,
}

pub struct Server {
    config: Mutex<ServerConfig>,
    queue: RequestQueue,
    processor: Arc<QueueProcessor>,
    processor_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    collectors: Mutex<Option<RunningCollectors>>,
    lifecycle: Arc<Lifecycle<ServerState>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => RequestQueue::bounded(capacity),
            None => RequestQueue::unbounded(),
        };
        let processor = Arc::new(QueueProcessor::with_internal_stats(
            queue.clone(),
            config.flush_interval,
            config.internal_stats,
        ));
        for spec in &config.destinations {
            processor.add_destination(spec.build());
        }

        Server {
            config: Mutex::new(config),
            queue,
            processor,
            processor_handle: Mutex::new(None),
            collectors: Mutex::new(None),
            lifecycle: Arc::new(Lifecycle::new(ServerState::Init)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.get() == ServerState::Running
    }

    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(ServerState::Running, timeout)
    }

    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_until(ServerState::Stopped, timeout)
    }

    /// Starts the processor, then every configured collector, in that
    /// order. A bind failure on any collector is fatal and aborts startup
    /// of the remaining ones.
    pub fn start(&self) -> Result<(), ShelfdError> {
        self.lifecycle.set(ServerState::Starting);

        let driver = Arc::clone(&self.processor);
        *self.processor_handle.lock() = Some(
            std::thread::Builder::new()
                .name("shelfd-processor".to_string())
                .spawn(move || driver.process())
                .expect("failed to spawn processor thread"),
        );
        self.processor.wait_until_processing(Duration::from_secs(5));

        let config = self.config.lock().clone();
        let running = self.start_collectors(&config)?;
        *self.collectors.lock() = Some(running);

        self.lifecycle.set(ServerState::Running);
        info!("shelfd running");
        Ok(())
    }

    fn start_collectors(&self, config: &ServerConfig) -> Result<RunningCollectors, ShelfdError> {
        let mut udp = Vec::new();
        for spec in &config.udp_collectors {
            let options: CollectorOptions = spec.into();
            let collector = Arc::new(UdpCollector::new(options, self.queue.clone()));
            collector.bind().map_err(ShelfdError::Collector)?;
            udp.push(collector);
        }

        let mut tcp = Vec::new();
        for spec in &config.tcp_collectors {
            let options: CollectorOptions = spec.into();
            let collector = Arc::new(TcpCollector::new(
                options,
                self.queue.clone(),
                config.collector_threads,
                config.collector_threads_limit,
            ));
            collector.bind().map_err(ShelfdError::Collector)?;
            tcp.push(collector);
        }

        // Every collector has bound; now (and only now) drop privileges.
        privilege::drop_privileges(config.user.as_deref(), config.group.as_deref())
            .map_err(ShelfdError::Collector)?;

        let mut handles = Vec::new();
        for collector in &udp {
            let driver = Arc::clone(collector);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("shelfd-udp-{}", driver.addr()))
                    .spawn(move || driver.serve())
                    .expect("failed to spawn udp collector thread"),
            );
        }
        for collector in &tcp {
            let driver = Arc::clone(collector);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("shelfd-tcp-{}", driver.addr()))
                    .spawn(move || driver.serve())
                    .expect("failed to spawn tcp collector thread"),
            );
        }

        for collector in &udp {
            collector.wait_until_queuing_requests(Duration::from_secs(5));
        }
        for collector in &tcp {
            collector.wait_until_queuing_requests(Duration::from_secs(5));
        }

        Ok(RunningCollectors { udp, tcp, handles })
    }

    fn stop_collectors(&self, timeout: Duration) {
        let Some(running) = self.collectors.lock().take() else {
            return;
        };
        for collector in &running.udp {
            collector.shutdown();
        }
        for collector in &running.tcp {
            collector.shutdown();
        }
        for collector in &running.udp {
            if !collector.wait_until_shutdown(timeout) {
                warn!(addr = %collector.addr(), "collector did not stop within timeout, proceeding anyway");
            }
        }
        for collector in &running.tcp {
            if !collector.wait_until_shutdown(timeout) {
                warn!(addr = %collector.addr(), "collector did not stop within timeout, proceeding anyway");
            }
        }
        for handle in running.handles {
            let _ = handle.join();
        }
    }

    /// Graceful shutdown: collectors first, then the processor's final
    /// drain-and-flush. No error condition skips the final flush.
    pub fn stop(&self, timeout: Duration) {
        self.lifecycle.set(ServerState::ShuttingDown);
        self.stop_collectors(timeout);

        self.processor.shutdown();
        if !self.processor.wait_until_shutdown(timeout) {
            warn!("processor did not report shutdown within timeout; final flush may be delayed");
        }
        if let Some(handle) = self.processor_handle.lock().take() {
            let _ = handle.join();
        }

        self.lifecycle.set(ServerState::Stopped);
        info!("shelfd stopped");
    }

    /// Stops collectors and destinations, swaps in `new_config`, and
    /// restarts collectors. The processor keeps running throughout, so the
    /// shelf and `last_flush` are preserved verbatim.
    pub fn reload(&self, new_config: ServerConfig, timeout: Duration) -> Result<(), ShelfdError> {
        info!("reloading configuration");
        self.stop_collectors(timeout);

        self.processor.clear_destinations();
        for spec in &new_config.destinations {
            self.processor.add_destination(spec.build());
        }

        let running = self.start_collectors(&new_config)?;
        *self.config.lock() = new_config;
        *self.collectors.lock() = Some(running);
        info!("reload complete");
        Ok(())
    }

    /// Blocks, handling reload/stop requests delivered over `signal_rx`,
    /// until a `Stop` is processed and shutdown completes.
    ///
    /// `reload_config` re-reads CLI args/config file and resolves a fresh
    /// [`ServerConfig`] — that re-reading is owned by the caller (`main.rs`),
    /// not by the supervisor, which only ever consumes an already-resolved
    /// config.
    pub fn run<F>(&self, signal_rx: Receiver<ControlSignal>, timeout: Duration, mut reload_config: F)
    where
        F: FnMut() -> Result<ServerConfig, ShelfdError>,
    {
        for signal in signal_rx {
            match signal {
                ControlSignal::Reload => match reload_config() {
                    Ok(config) => {
                        if let Err(err) = self.reload(config, timeout) {
                            warn!(error = %err, "reload failed, continuing with previous collectors");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to re-read configuration, keeping previous collectors");
                    }
                },
                ControlSignal::Stop => {
                    self.stop(timeout);
                    return;
                }
            }
        }
    }
}
