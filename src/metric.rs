//! Statsd wire-line parsing: `name:value|type[|@sample_rate]` -> [`Metric`].

use crate::error::ParseError;

/// A single parsed metric sample, tagged by kind.
///
/// Modeled as a closed variant rather than a trait hierarchy: the shelf
/// dispatches on the tag directly instead of calling back into the metric.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Counter {
        name: String,
        value: f64,
        sample_rate: f64,
    },
    Gauge {
        name: String,
        value: f64,
    },
    GaugeDelta {
        name: String,
        delta: f64,
    },
    Set {
        name: String,
        member: String,
    },
    Timer {
        name: String,
        value: f64,
        sample_rate: f64,
    },
}

impl Metric {
    pub fn name(&self) -> &str {
        match self {
            Metric::Counter { name, .. }
            | Metric::Gauge { name, .. }
            | Metric::GaugeDelta { name, .. }
            | Metric::Set { name, .. }
            | Metric::Timer { name, .. } => name,
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c == ':' || c == '|' || c == '@' || c.is_whitespace() || c.is_control())
}

/// Parses a single Statsd line (no trailing newline).
///
/// Malformed lines never panic; the caller (the queue processor) is
/// expected to drop them and keep going.
pub fn parse_line(line: &str) -> Result<Metric, ParseError> {
    let (name, rest) = line.split_once(':').ok_or(ParseError::MissingFields)?;
    if !is_valid_name(name) {
        return Err(ParseError::EmptyName);
    }

    let mut fields = rest.split('|');
    let value_str = fields.next().ok_or(ParseError::MissingFields)?;
    let type_str = fields.next().ok_or(ParseError::MissingFields)?;
    let sample_str = fields.next();
    if fields.next().is_some() {
        return Err(ParseError::MissingFields);
    }

    let sample_rate = match sample_str {
        None => 1.0,
        Some(s) => {
            let digits = s.strip_prefix('@').ok_or(ParseError::MalformedSampleRate)?;
            let rate: f64 = digits
                .parse()
                .map_err(|_| ParseError::InvalidSampleRate(digits.to_string()))?;
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ParseError::InvalidSampleRate(digits.to_string()));
            }
            rate
        }
    };

    let name = name.to_string();
    match type_str {
        "c" => {
            let value: f64 = value_str
                .parse()
                .map_err(|_| ParseError::InvalidValue(value_str.to_string()))?;
            Ok(Metric::Counter {
                name,
                value,
                sample_rate,
            })
        }
        "ms" => {
            let value: f64 = value_str
                .parse()
                .map_err(|_| ParseError::InvalidValue(value_str.to_string()))?;
            Ok(Metric::Timer {
                name,
                value,
                sample_rate,
            })
        }
        "g" => {
            if let Some(stripped) = value_str
                .strip_prefix('+')
                .or_else(|| value_str.strip_prefix('-'))
            {
                let magnitude: f64 = stripped
                    .parse()
                    .map_err(|_| ParseError::InvalidValue(value_str.to_string()))?;
                let delta = if value_str.starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };
                Ok(Metric::GaugeDelta { name, delta })
            } else {
                let value: f64 = value_str
                    .parse()
                    .map_err(|_| ParseError::InvalidValue(value_str.to_string()))?;
                Ok(Metric::Gauge { name, value })
            }
        }
        "s" => {
            if value_str.is_empty() {
                return Err(ParseError::EmptySetMember);
            }
            Ok(Metric::Set {
                name,
                member: value_str.to_string(),
            })
        }
        other => Err(ParseError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counter() {
        let m = parse_line("hits:3|c").unwrap();
        assert_eq!(
            m,
            Metric::Counter {
                name: "hits".into(),
                value: 3.0,
                sample_rate: 1.0
            }
        );
    }

    #[test]
    fn parses_counter_with_sample_rate() {
        let m = parse_line("hits:2|c|@0.5").unwrap();
        assert_eq!(
            m,
            Metric::Counter {
                name: "hits".into(),
                value: 2.0,
                sample_rate: 0.5
            }
        );
    }

    #[test]
    fn parses_absolute_gauge() {
        let m = parse_line("temp:50|g").unwrap();
        assert_eq!(
            m,
            Metric::Gauge {
                name: "temp".into(),
                value: 50.0
            }
        );
    }

    #[test]
    fn parses_gauge_delta_positive_and_negative() {
        assert_eq!(
            parse_line("temp:+5|g").unwrap(),
            Metric::GaugeDelta {
                name: "temp".into(),
                delta: 5.0
            }
        );
        assert_eq!(
            parse_line("temp:-2|g").unwrap(),
            Metric::GaugeDelta {
                name: "temp".into(),
                delta: -2.0
            }
        );
    }

    #[test]
    fn parses_set_member() {
        let m = parse_line("users:alice|s").unwrap();
        assert_eq!(
            m,
            Metric::Set {
                name: "users".into(),
                member: "alice".into()
            }
        );
    }

    #[test]
    fn parses_timer() {
        let m = parse_line("t:10|ms").unwrap();
        assert_eq!(
            m,
            Metric::Timer {
                name: "t".into(),
                value: 10.0,
                sample_rate: 1.0
            }
        );
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(parse_line(":1|c").unwrap_err(), ParseError::EmptyName);
    }

    #[test]
    fn rejects_missing_colon() {
        assert_eq!(
            parse_line("bad_line_without_value").unwrap_err(),
            ParseError::MissingFields
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            parse_line("x:1|zz").unwrap_err(),
            ParseError::UnknownType(_)
        ));
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        assert!(matches!(
            parse_line("x:1|c|@1.5").unwrap_err(),
            ParseError::InvalidSampleRate(_)
        ));
        assert!(matches!(
            parse_line("x:1|c|@0").unwrap_err(),
            ParseError::InvalidSampleRate(_)
        ));
    }

    #[test]
    fn rejects_malformed_sample_rate_annotation() {
        assert_eq!(
            parse_line("x:1|c|0.5").unwrap_err(),
            ParseError::MalformedSampleRate
        );
    }

    #[test]
    fn rejects_name_with_control_chars() {
        assert_eq!(parse_line("a b:1|c").unwrap_err(), ParseError::EmptyName);
    }
}
