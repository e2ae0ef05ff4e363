//! Destinations: sinks that accept a batch of flush records.

pub mod file;
pub mod graphite;
pub mod stdout;

use crate::error::DestinationError;
use crate::shelf::FlushRecord;

/// A downstream sink for aggregated flush records.
///
/// Implementations are owned exclusively by the queue processor and called
/// synchronously from its driver thread; `send` must not block
/// indefinitely on a destination that will never recover (reconnect logic
/// belongs behind this trait, not in the processor).
pub trait Destination: Send {
    /// A short name for logging (e.g. `"graphite:localhost:2003"`).
    fn name(&self) -> &str;

    /// Sends every record in order. On failure the destination is expected
    /// to mark itself for reconnect on the next call; the caller drops the
    /// batch for this destination only.
    fn send(&mut self, records: &[FlushRecord]) -> Result<(), DestinationError>;
}

fn format_carbon_line(record: &FlushRecord) -> String {
    let mut ts_buf = itoa::Buffer::new();
    let ts = ts_buf.format(record.timestamp as i64);
    format!("{} {} {}\n", record.name, record.value, ts)
}

fn format_csv_line(record: &FlushRecord) -> String {
    let mut ts_buf = itoa::Buffer::new();
    let ts = ts_buf.format(record.timestamp as i64);
    format!("{},{},{}\n", record.name, record.value, ts)
}
