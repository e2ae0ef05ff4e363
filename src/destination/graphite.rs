//! A reconnecting Carbon/Graphite line destination over TCP.

use std::io::Write;
use std::net::TcpStream;

use tracing::{debug, warn};

use crate::error::DestinationError;
use crate::shelf::FlushRecord;

use super::{format_carbon_line, Destination};

pub struct GraphiteDestination {
    addr: String,
    name: String,
    conn: Option<TcpStream>,
}

impl GraphiteDestination {
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let name = format!("graphite:{addr}");
        GraphiteDestination {
            addr,
            name,
            conn: None,
        }
    }

    fn ensure_connected(&mut self) -> Result<(), DestinationError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.addr).map_err(|source| DestinationError::Io {
            name: self.name.clone(),
            source,
        })?;
        debug!(addr = %self.addr, "connected to graphite destination");
        self.conn = Some(stream);
        Ok(())
    }
}

impl Destination for GraphiteDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, records: &[FlushRecord]) -> Result<(), DestinationError> {
        self.ensure_connected()?;
        let stream = self.conn.as_mut().expect("just connected");

        let mut buf = String::new();
        for record in records {
            buf.push_str(&format_carbon_line(record));
        }

        let result = stream
            .write_all(buf.as_bytes())
            .and_then(|_| stream.flush());

        if let Err(source) = result {
            warn!(addr = %self.addr, error = %source, "graphite write failed, will reconnect");
            self.conn = None;
            return Err(DestinationError::Io {
                name: self.name.clone(),
                source,
            });
        }

        Ok(())
    }
}
