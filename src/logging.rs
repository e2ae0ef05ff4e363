//! Installs the process-wide `tracing` subscriber from CLI flags.
//!
//! Every core component logs through `tracing::{debug,warn,error}` macros,
//! never `println!`/`eprintln!` — the one exception is the `flush-stdout`
//! destination, which is a data sink rather than a log sink.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{CliArgs, DEFAULT_LOG_LEVEL};

const DEFAULT_SYSLOG_SOCKET: &str = "/dev/log";

/// Installs the global subscriber. Idempotent across the process lifetime:
/// a reload never re-installs logging, only re-reads the rest of the config.
pub fn init(args: &CliArgs) -> Result<(), io::Error> {
    let log_level = args.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let file_writer = match &args.log_file {
        Some(path) => Some(open_append(path)?),
        None => None,
    };
    let syslog_writer = if args.log_syslog {
        let socket_path = args
            .syslog_socket
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSLOG_SOCKET));
        Some(SyslogWriter::connect(&socket_path)?)
    } else {
        None
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (file_writer, syslog_writer, args.log_stderr) {
        (None, None, _) => {
            builder.with_writer(io::stderr).init();
        }
        (file, syslog, stderr) => {
            builder
                .with_writer(FanOutWriter {
                    file,
                    syslog,
                    stderr,
                })
                .init();
        }
    }

    Ok(())
}

/// A minimal RFC3164-style syslog datagram writer: no framing beyond a
/// `<PRI>` prefix, one datagram per `write` call. Deliberately small
/// rather than pulling in a full syslog wire-format crate for this.
///
/// Unix-only (it's a `UnixDatagram` under the hood); the `#[cfg(not(unix))]`
/// stand-in below keeps the crate building everywhere, and fails loudly at
/// `connect` time rather than pretending to deliver anything if `--log-syslog`
/// is actually requested on a target where it can't work.
#[cfg(unix)]
struct SyslogWriter {
    socket: std::sync::Arc<std::os::unix::net::UnixDatagram>,
}

#[cfg(unix)]
impl Clone for SyslogWriter {
    fn clone(&self) -> Self {
        SyslogWriter {
            socket: std::sync::Arc::clone(&self.socket),
        }
    }
}

#[cfg(unix)]
impl SyslogWriter {
    const FACILITY_DAEMON: u8 = 3;
    const SEVERITY_INFO: u8 = 6;

    fn connect(socket_path: &Path) -> io::Result<Self> {
        let socket = std::os::unix::net::UnixDatagram::unbound()?;
        socket.connect(socket_path)?;
        Ok(SyslogWriter {
            socket: std::sync::Arc::new(socket),
        })
    }
}

#[cfg(unix)]
impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pri = (Self::FACILITY_DAEMON << 3) | Self::SEVERITY_INFO;
        let mut datagram = format!("<{pri}>shelfd: ").into_bytes();
        datagram.extend_from_slice(buf.strip_suffix(b"\n").unwrap_or(buf));
        self.socket.send(&datagram)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(not(unix))]
#[derive(Clone)]
struct SyslogWriter;

#[cfg(not(unix))]
impl SyslogWriter {
    fn connect(_socket_path: &Path) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "log-syslog is only supported on unix targets",
        ))
    }
}

#[cfg(not(unix))]
impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<AppendFile, io::Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(AppendFile {
        inner: std::sync::Arc::new(parking_lot::Mutex::new(file)),
    })
}

#[derive(Clone)]
struct AppendFile {
    inner: std::sync::Arc<parking_lot::Mutex<std::fs::File>>,
}

/// Writes every log line to whichever of stderr/file/syslog are configured.
struct FanOutWriter {
    file: Option<AppendFile>,
    syslog: Option<SyslogWriter>,
    stderr: bool,
}

impl io::Write for FanOutWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write as _;
        if self.stderr {
            io::stderr().write_all(buf)?;
        }
        if let Some(file) = &self.file {
            file.inner.lock().write_all(buf)?;
        }
        if let Some(syslog) = &mut self.syslog {
            syslog.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        use std::io::Write as _;
        if self.stderr {
            io::stderr().flush()?;
        }
        if let Some(file) = &self.file {
            file.inner.lock().flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for FanOutWriter {
    type Writer = FanOutWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FanOutWriter {
            file: self.file.clone(),
            syslog: self.syslog.clone(),
            stderr: self.stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    #[cfg(unix)]
    fn syslog_writer_sends_one_prefixed_datagram_per_write() {
        use std::os::unix::net::UnixDatagram;

        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = UnixDatagram::bind(&socket_path).unwrap();

        let mut writer = SyslogWriter::connect(&socket_path).unwrap();
        writer.write_all(b"hello world\n").unwrap();

        let mut buf = [0u8; 256];
        let n = listener.recv(&mut buf).unwrap();
        let received = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(received.starts_with("<27>shelfd: "));
        assert!(received.ends_with("hello world"));
    }

    #[test]
    #[cfg(not(unix))]
    fn syslog_writer_fails_to_connect_on_non_unix() {
        assert!(SyslogWriter::connect(Path::new("/dev/log")).is_err());
    }

    #[test]
    fn append_file_writes_are_durable_across_clones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelfd.log");
        let file = open_append(&path).unwrap();
        let mut fan_out = FanOutWriter {
            file: Some(file.clone()),
            syslog: None,
            stderr: false,
        };
        fan_out.write_all(b"line one\n").unwrap();
        fan_out.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "line one\n");
    }
}
