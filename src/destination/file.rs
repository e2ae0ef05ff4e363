//! File destinations, in Carbon or CSV line format.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DestinationError;
use crate::shelf::FlushRecord;

use super::{format_carbon_line, format_csv_line, Destination};

enum LineFormat {
    Carbon,
    Csv,
}

pub struct FileDestination {
    path: PathBuf,
    name: String,
    format: LineFormat,
    file: Option<BufWriter<File>>,
}

impl FileDestination {
    pub fn carbon(path: impl AsRef<Path>) -> Self {
        Self::new(path, LineFormat::Carbon)
    }

    pub fn csv(path: impl AsRef<Path>) -> Self {
        Self::new(path, LineFormat::Csv)
    }

    fn new(path: impl AsRef<Path>, format: LineFormat) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        FileDestination {
            path,
            name,
            format,
            file: None,
        }
    }

    fn ensure_open(&mut self) -> Result<(), DestinationError> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| DestinationError::Io {
                name: self.name.clone(),
                source,
            })?;
        self.file = Some(BufWriter::new(file));
        Ok(())
    }
}

impl Destination for FileDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, records: &[FlushRecord]) -> Result<(), DestinationError> {
        self.ensure_open()?;
        let writer = self.file.as_mut().expect("just opened");

        let format_line = match self.format {
            LineFormat::Carbon => format_carbon_line,
            LineFormat::Csv => format_csv_line,
        };

        let result = (|| -> std::io::Result<()> {
            for record in records {
                writer.write_all(format_line(record).as_bytes())?;
            }
            writer.flush()
        })();

        if let Err(source) = result {
            self.file = None;
            return Err(DestinationError::Io {
                name: self.name.clone(),
                source,
            });
        }

        Ok(())
    }
}
