//! Configuration: CLI flags, an optional `key = value` file merged under
//! them, and the validated [`ServerConfig`] the supervisor actually runs
//! from.
//!
//! This is deliberately the minimal form of a configuration loader the
//! binary needs to drive its own startup and tests, not a general INI
//! parser.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::destination::file::FileDestination;
use crate::destination::graphite::GraphiteDestination;
use crate::destination::stdout::StdoutDestination;
use crate::destination::Destination;
use crate::error::ConfigError;

const DEFAULT_COLLECT_ADDR: &str = "127.0.0.1:8125";
const DEFAULT_GRAPHITE_PORT: u16 = 2003;
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FLUSH_INTERVAL_SECS: f64 = 10.0;

/// Raw CLI flags.
///
/// `log_level` and `flush_interval` are left as `Option` rather than given
/// a `default_value_t` so [`CliArgs::merge_config_file`] can tell "not set
/// on the command line" apart from "set to the same value as the default"
/// and let a file-only value through; the actual defaults are applied once,
/// in [`ServerConfig::from_cli_args`] and [`crate::logging::init`].
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "shelfd", about = "Statsd-compatible metrics aggregation server")]
pub struct CliArgs {
    /// Path to an optional `key = value` config file; CLI flags win on conflict.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    #[arg(long = "log-stderr", default_value_t = true)]
    pub log_stderr: bool,

    #[arg(long = "log-syslog", default_value_t = false)]
    pub log_syslog: bool,

    #[arg(long = "syslog-socket")]
    pub syslog_socket: Option<PathBuf>,

    #[arg(long = "flush-interval")]
    pub flush_interval: Option<f64>,

    #[arg(long = "flush-stdout", default_value_t = false)]
    pub flush_stdout: bool,

    /// Comma list of `host[:port]` Carbon destinations (default port 2003).
    #[arg(long = "flush-graphite")]
    pub flush_graphite: Option<String>,

    /// Pipe list of file paths receiving Carbon-format lines.
    #[arg(long = "flush-file")]
    pub flush_file: Option<String>,

    /// Pipe list of file paths receiving CSV lines.
    #[arg(long = "flush-file-csv")]
    pub flush_file_csv: Option<String>,

    /// Comma list of `[host][:port]` UDP bind addresses.
    #[arg(long = "collect-udp")]
    pub collect_udp: Option<String>,

    /// Comma list of `[host][:port]` TCP bind addresses.
    #[arg(long = "collect-tcp")]
    pub collect_tcp: Option<String>,

    #[arg(long = "collector-threads", default_value_t = 4)]
    pub collector_threads: usize,

    #[arg(long = "collector-threads-limit", default_value_t = 32)]
    pub collector_threads_limit: usize,

    #[arg(long = "user")]
    pub user: Option<String>,

    #[arg(long = "group")]
    pub group: Option<String>,

    /// Optional bound on the shared request queue; unbounded if absent.
    #[arg(long = "queue-capacity")]
    pub queue_capacity: Option<usize>,

    /// Fold pipeline-internal counters into the shelf on each flush.
    #[arg(long = "internal-stats", default_value_t = false)]
    pub internal_stats: bool,
}

impl CliArgs {
    /// Merges entries from an optional config file under the CLI flags
    /// already parsed from argv: a value set on the command line always
    /// wins, a config-file value only fills in what argv left unset.
    ///
    /// Lines are `key = value`; blank lines and lines starting with `#` or
    /// `;` are ignored. Unknown keys are a syntax error rather than silently
    /// dropped so typos in the config file fail loudly at startup.
    pub fn merge_config_file(mut self) -> Result<Self, ConfigError> {
        let Some(path) = self.config_file.clone() else {
            return Ok(self);
        };
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::ConfigFileRead {
                path: path.display().to_string(),
                source,
            })?;

        for (line_no, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::ConfigFileSyntax {
                    line_no: line_no + 1,
                    line: raw_line.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim();
            self.apply_file_entry(key, value, line_no + 1, raw_line)?;
        }
        Ok(self)
    }

    fn apply_file_entry(
        &mut self,
        key: &str,
        value: &str,
        line_no: usize,
        raw_line: &str,
    ) -> Result<(), ConfigError> {
        macro_rules! set_if_absent {
            ($field:expr, $value:expr) => {
                if $field.is_none() {
                    $field = Some($value);
                }
            };
        }

        match key {
            "log-level" => set_if_absent!(self.log_level, value.to_string()),
            "log-file" => set_if_absent!(self.log_file, PathBuf::from(value)),
            "syslog-socket" => set_if_absent!(self.syslog_socket, PathBuf::from(value)),
            "flush-interval" => {
                if self.flush_interval.is_none() {
                    let parsed: f64 = value.parse().map_err(|_| ConfigError::ConfigFileSyntax {
                        line_no,
                        line: raw_line.to_string(),
                    })?;
                    self.flush_interval = Some(parsed);
                }
            }
            "flush-graphite" => set_if_absent!(self.flush_graphite, value.to_string()),
            "flush-file" => set_if_absent!(self.flush_file, value.to_string()),
            "flush-file-csv" => set_if_absent!(self.flush_file_csv, value.to_string()),
            "collect-udp" => set_if_absent!(self.collect_udp, value.to_string()),
            "collect-tcp" => set_if_absent!(self.collect_tcp, value.to_string()),
            "user" => set_if_absent!(self.user, value.to_string()),
            "group" => set_if_absent!(self.group, value.to_string()),
            _ => {
                return Err(ConfigError::ConfigFileSyntax {
                    line_no,
                    line: raw_line.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// A destination the resolved config says to construct, deferred until
/// `ServerConfig` is handed to the supervisor so tests can inspect the
/// resolved addresses/paths without opening real sockets or files.
#[derive(Debug, Clone)]
pub enum DestinationSpec {
    Stdout,
    Graphite(SocketAddr),
    File(PathBuf),
    FileCsv(PathBuf),
}

impl DestinationSpec {
    pub fn build(&self) -> Box<dyn Destination> {
        match self {
            DestinationSpec::Stdout => Box::new(StdoutDestination::new()),
            DestinationSpec::Graphite(addr) => Box::new(GraphiteDestination::new(addr.to_string())),
            DestinationSpec::File(path) => Box::new(FileDestination::carbon(path)),
            DestinationSpec::FileCsv(path) => Box::new(FileDestination::csv(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSpec {
    pub host: String,
    pub port: u16,
}

/// The resolved, validated configuration the supervisor runs from.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub flush_interval: Duration,
    pub destinations: Vec<DestinationSpec>,
    pub udp_collectors: Vec<CollectorSpec>,
    pub tcp_collectors: Vec<CollectorSpec>,
    pub collector_threads: usize,
    pub collector_threads_limit: usize,
    pub user: Option<String>,
    pub group: Option<String>,
    pub queue_capacity: Option<usize>,
    pub internal_stats: bool,
}

impl ServerConfig {
    pub fn from_cli_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let flush_interval = args.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
        if !(flush_interval > 0.0) {
            return Err(ConfigError::MustBePositive {
                field: "flush-interval",
                value: flush_interval.to_string(),
            });
        }
        if args.collector_threads > args.collector_threads_limit {
            return Err(ConfigError::ThreadBoundsInverted {
                threads: args.collector_threads,
                limit: args.collector_threads_limit,
            });
        }
        if !cfg!(unix) && (args.user.is_some() || args.group.is_some()) {
            return Err(ConfigError::PrivilegeUnsupported);
        }

        let mut destinations = Vec::new();
        if args.flush_stdout {
            destinations.push(DestinationSpec::Stdout);
        }
        if let Some(list) = &args.flush_graphite {
            for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                destinations.push(DestinationSpec::Graphite(parse_graphite_addr(entry)?));
            }
        }
        if let Some(list) = &args.flush_file {
            for entry in list.split('|').map(str::trim).filter(|s| !s.is_empty()) {
                destinations.push(DestinationSpec::File(PathBuf::from(entry)));
            }
        }
        if let Some(list) = &args.flush_file_csv {
            for entry in list.split('|').map(str::trim).filter(|s| !s.is_empty()) {
                destinations.push(DestinationSpec::FileCsv(PathBuf::from(entry)));
            }
        }

        let udp_collectors = parse_collector_list(args.collect_udp.as_deref(), "collect-udp")?;
        let tcp_collectors = parse_collector_list(args.collect_tcp.as_deref(), "collect-tcp")?;

        Ok(ServerConfig {
            flush_interval: Duration::from_secs_f64(flush_interval),
            destinations,
            udp_collectors,
            tcp_collectors,
            collector_threads: args.collector_threads,
            collector_threads_limit: args.collector_threads_limit,
            user: args.user.clone(),
            group: args.group.clone(),
            queue_capacity: args.queue_capacity,
            internal_stats: args.internal_stats,
        })
    }
}

/// Parses a `host[:port]` entry, defaulting the port to the Carbon
/// convention (2003) when absent.
fn parse_graphite_addr(entry: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if entry.contains(':') {
        entry.to_string()
    } else {
        format!("{entry}:{DEFAULT_GRAPHITE_PORT}")
    };
    candidate
        .parse()
        .map_err(|err| ConfigError::InvalidAddress(entry.to_string(), err))
}

/// Parses a comma list of `[host][:port]` collector bind addresses,
/// defaulting to `127.0.0.1:8125` when the list is absent or an entry
/// omits host/port.
fn parse_collector_list(
    list: Option<&str>,
    field: &'static str,
) -> Result<Vec<CollectorSpec>, ConfigError> {
    let Some(list) = list else {
        let (host, port) = split_host_port(DEFAULT_COLLECT_ADDR);
        return Ok(vec![CollectorSpec { host, port }]);
    };

    let mut specs = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let candidate = if entry.starts_with(':') {
            format!("127.0.0.1{entry}")
        } else if !entry.contains(':') {
            format!("{entry}:8125")
        } else {
            entry.to_string()
        };
        let (host, port) = split_host_port(&candidate);
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(entry.to_string(), addr_parse_error()))?;
        specs.push(CollectorSpec { host, port });
    }
    if specs.is_empty() {
        return Err(ConfigError::EmptyAddressList(field));
    }
    Ok(specs)
}

fn split_host_port(addr: &str) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(8125)),
        None => (addr.to_string(), 8125),
    }
}

fn addr_parse_error() -> std::net::AddrParseError {
    "not-an-address".parse::<SocketAddr>().unwrap_err()
}

impl From<&CollectorSpec> for crate::collector::CollectorOptions {
    fn from(spec: &CollectorSpec) -> Self {
        crate::collector::CollectorOptions {
            host: spec.host.clone(),
            port: spec.port,
        }
    }
}
