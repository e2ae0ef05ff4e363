//! A destination that writes Carbon-format lines to standard output.

use std::io::{self, Write};

use crate::error::DestinationError;
use crate::shelf::FlushRecord;

use super::{format_carbon_line, Destination};

pub struct StdoutDestination {
    name: String,
}

impl StdoutDestination {
    pub fn new() -> Self {
        StdoutDestination {
            name: "stdout".to_string(),
        }
    }
}

impl Default for StdoutDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for StdoutDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, records: &[FlushRecord]) -> Result<(), DestinationError> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for record in records {
            handle
                .write_all(format_carbon_line(record).as_bytes())
                .map_err(|source| DestinationError::Io {
                    name: self.name.clone(),
                    source,
                })?;
        }
        handle.flush().map_err(|source| DestinationError::Io {
            name: self.name.clone(),
            source,
        })
    }
}
