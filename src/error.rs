use thiserror::Error;

/// Errors that can occur while parsing a single Statsd line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty metric name")]
    EmptyName,

    #[error("missing value/type fields after ':'")]
    MissingFields,

    #[error("unknown metric type: {0}")]
    UnknownType(String),

    #[error("invalid numeric value: {0}")]
    InvalidValue(String),

    #[error("sample rate must be in (0, 1], got {0}")]
    InvalidSampleRate(String),

    #[error("sample rate annotation must start with '@'")]
    MalformedSampleRate,

    #[error("set metric requires a non-empty member")]
    EmptySetMember,
}

/// Errors returned by a [`crate::destination::Destination`] flush attempt.
#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("i/o error talking to destination {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("destination {0} is not currently connected")]
    NotConnected(String),
}

/// Errors surfaced by a collector during configuration, binding, or serving.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to bind {kind} collector on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to drop privileges to user={user:?} group={group:?}: {source}")]
    PrivilegeDrop {
        user: Option<String>,
        group: Option<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while serving: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in resolving CLI flags / config file content into a [`crate::config::ServerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be greater than 0, got {value}")]
    MustBePositive { field: &'static str, value: String },

    #[error("collector-threads ({threads}) must be <= collector-threads-limit ({limit})")]
    ThreadBoundsInverted { threads: usize, limit: usize },

    #[error("invalid socket address '{0}': {1}")]
    InvalidAddress(String, std::net::AddrParseError),

    #[error("empty address list for {0}")]
    EmptyAddressList(&'static str),

    #[error("failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file line {line_no}: {line}")]
    ConfigFileSyntax { line_no: usize, line: String },

    #[error("user/group drop is not supported on this platform")]
    PrivilegeUnsupported,
}

/// Top-level error composing every subsystem's error type.
///
/// Library code returns the narrower, subsystem-specific error types above;
/// `main.rs` is the only place that needs to talk about all of them at once.
#[derive(Error, Debug)]
pub enum ShelfdError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

pub type ShelfdResult<T> = Result<T, ShelfdError>;
