//! The stats shelf: a single-owner in-memory aggregator.
//!
//! No internal locking. Every method here is only ever called from the
//! queue processor's driver thread (see [`crate::processor`]).

use std::collections::{HashMap, HashSet};

use crate::metric::Metric;

/// One aggregated output row produced by a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushRecord {
    pub name: String,
    pub value: f64,
    pub timestamp: f64,
}

impl FlushRecord {
    fn new(name: impl Into<String>, value: f64, timestamp: f64) -> Self {
        FlushRecord {
            name: name.into(),
            value,
            timestamp,
        }
    }
}

#[derive(Default)]
pub struct Shelf {
    counters: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
    sets: HashMap<String, HashSet<String>>,
    timers: HashMap<String, Vec<f64>>,
    bad_lines_since_flush: u64,
}

impl Shelf {
    pub fn new() -> Self {
        Shelf::default()
    }

    /// Folds a single parsed metric into the shelf.
    pub fn add(&mut self, metric: Metric) {
        match metric {
            Metric::Counter {
                name,
                value,
                sample_rate,
            } => {
                *self.counters.entry(name).or_insert(0.0) += value / sample_rate;
            }
            Metric::Gauge { name, value } => {
                self.gauges.insert(name, value);
            }
            Metric::GaugeDelta { name, delta } => {
                *self.gauges.entry(name).or_insert(0.0) += delta;
            }
            Metric::Set { name, member } => {
                self.sets.entry(name).or_default().insert(member);
            }
            Metric::Timer {
                name,
                value,
                sample_rate,
            } => {
                let repeats = (1.0 / sample_rate).round().max(1.0) as usize;
                let entry = self.timers.entry(name).or_default();
                entry.extend(std::iter::repeat(value).take(repeats));
            }
        }
    }

    /// Records one dropped line. Folded into the next flush as a single
    /// summary counter rather than logged per-line (see `processor`).
    pub fn record_parse_failure(&mut self) {
        self.bad_lines_since_flush += 1;
    }

    pub fn bad_lines_since_flush(&self) -> u64 {
        self.bad_lines_since_flush
    }

    /// Atomically produces flush records for the current state and clears it.
    pub fn snapshot_and_clear(&mut self, now: f64, flush_interval: f64) -> Vec<FlushRecord> {
        let mut records = Vec::new();

        for (name, sum) in self.counters.drain() {
            records.push(FlushRecord::new(name.clone(), sum, now));
            records.push(FlushRecord::new(format!("{name}.rate"), sum / flush_interval, now));
        }

        for (name, value) in self.gauges.drain() {
            records.push(FlushRecord::new(name, value, now));
        }

        for (name, members) in self.sets.drain() {
            records.push(FlushRecord::new(name, members.len() as f64, now));
        }

        for (name, xs) in self.timers.drain() {
            if xs.is_empty() {
                continue;
            }
            let count = xs.len() as f64;
            let sum: f64 = xs.iter().sum();
            let lower = xs.iter().cloned().fold(f64::INFINITY, f64::min);
            let upper = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mean = sum / count;
            records.push(FlushRecord::new(format!("{name}.count"), count, now));
            records.push(FlushRecord::new(format!("{name}.lower"), lower, now));
            records.push(FlushRecord::new(format!("{name}.upper"), upper, now));
            records.push(FlushRecord::new(format!("{name}.mean"), mean, now));
            records.push(FlushRecord::new(format!("{name}.sum"), sum, now));
        }

        self.bad_lines_since_flush = 0;
        records
    }

    /// Resets every inner container to empty without producing records.
    pub fn clear(&mut self) {
        self.counters.clear();
        self.gauges.clear();
        self.sets.clear();
        self.timers.clear();
        self.bad_lines_since_flush = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(records: &'a [FlushRecord], name: &str) -> &'a FlushRecord {
        records
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("no record named {name}"))
    }

    #[test]
    fn counter_sum_law() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::Counter {
            name: "hits".into(),
            value: 3.0,
            sample_rate: 1.0,
        });
        shelf.add(Metric::Counter {
            name: "hits".into(),
            value: 2.0,
            sample_rate: 0.5,
        });
        let records = shelf.snapshot_and_clear(100.0, 10.0);
        assert_eq!(find(&records, "hits").value, 7.0);
        assert_eq!(find(&records, "hits.rate").value, 0.7);
    }

    #[test]
    fn gauge_last_write_wins_with_trailing_deltas() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::Gauge {
            name: "temp".into(),
            value: 50.0,
        });
        shelf.add(Metric::GaugeDelta {
            name: "temp".into(),
            delta: 5.0,
        });
        shelf.add(Metric::GaugeDelta {
            name: "temp".into(),
            delta: -2.0,
        });
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(find(&records, "temp").value, 53.0);
    }

    #[test]
    fn gauge_delta_with_no_prior_value_creates_gauge() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::GaugeDelta {
            name: "temp".into(),
            delta: 5.0,
        });
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(find(&records, "temp").value, 5.0);
    }

    #[test]
    fn set_cardinality() {
        let mut shelf = Shelf::new();
        for member in ["alice", "bob", "alice"] {
            shelf.add(Metric::Set {
                name: "users".into(),
                member: member.into(),
            });
        }
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(find(&records, "users").value, 2.0);
    }

    #[test]
    fn timer_aggregates() {
        let mut shelf = Shelf::new();
        for value in [10.0, 30.0, 20.0] {
            shelf.add(Metric::Timer {
                name: "t".into(),
                value,
                sample_rate: 1.0,
            });
        }
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(find(&records, "t.count").value, 3.0);
        assert_eq!(find(&records, "t.lower").value, 10.0);
        assert_eq!(find(&records, "t.upper").value, 30.0);
        assert_eq!(find(&records, "t.mean").value, 20.0);
        assert_eq!(find(&records, "t.sum").value, 60.0);
    }

    #[test]
    fn timer_sample_rate_repeats_and_floors_at_one() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::Timer {
            name: "t".into(),
            value: 5.0,
            sample_rate: 0.1,
        });
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(find(&records, "t.count").value, 10.0);
    }

    #[test]
    fn empty_timer_list_emits_nothing() {
        let mut shelf = Shelf::new();
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert!(records.is_empty());
    }

    #[test]
    fn shelf_reset_after_flush() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::Counter {
            name: "hits".into(),
            value: 1.0,
            sample_rate: 1.0,
        });
        let _ = shelf.snapshot_and_clear(0.0, 10.0);
        let records = shelf.snapshot_and_clear(1.0, 10.0);
        assert!(records.is_empty());
    }

    #[test]
    fn clear_drops_everything_without_records() {
        let mut shelf = Shelf::new();
        shelf.add(Metric::Counter {
            name: "hits".into(),
            value: 1.0,
            sample_rate: 1.0,
        });
        shelf.record_parse_failure();
        shelf.clear();
        assert_eq!(shelf.bad_lines_since_flush(), 0);
        let records = shelf.snapshot_and_clear(0.0, 10.0);
        assert!(records.is_empty());
    }

    #[test]
    fn bad_line_counter_resets_on_flush() {
        let mut shelf = Shelf::new();
        shelf.record_parse_failure();
        shelf.record_parse_failure();
        assert_eq!(shelf.bad_lines_since_flush(), 2);
        let _ = shelf.snapshot_and_clear(0.0, 10.0);
        assert_eq!(shelf.bad_lines_since_flush(), 0);
    }
}
