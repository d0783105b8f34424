//! Line-oriented packet trace parsing.
//!
//! This is explicitly external-collaborator code: the `lgps` core has no
//! opinion on trace formats at all. The format accepted here is the one
//! suggested as a test-harness convenience by the core's design
//! documentation: whitespace-separated `arrival_time length flow_id weight`
//! tuples, one per line, blank lines and `#`-prefixed comments ignored.

use std::fmt;

/// One parsed packet record from a trace line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord {
    pub arrival_time: f64,
    pub length: f64,
    pub flow_id: u64,
    pub weight: f64,
}

#[derive(Debug)]
pub enum ParseError {
    WrongFieldCount { found: usize },
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::WrongFieldCount { found } => write!(
                f,
                "expected 4 fields (arrival_time length flow_id weight), found {found}"
            ),
            ParseError::InvalidNumber { field, value } => {
                write!(f, "field `{field}` is not a valid number: {value:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a single trace line into a [`PacketRecord`].
///
/// Returns `Ok(None)` for blank lines and `#`-prefixed comments, which
/// callers should simply skip.
pub fn parse_line(line: &str) -> Result<Option<PacketRecord>, ParseError> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields = line.split_whitespace().collect::<Vec<_>>();

    let [arrival_time, length, flow_id, weight] = fields.as_slice() else {
        return Err(ParseError::WrongFieldCount {
            found: fields.len(),
        });
    };

    let parse = |field: &'static str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber {
                field,
                value: value.to_owned(),
            })
    };

    Ok(Some(PacketRecord {
        arrival_time: parse("arrival_time", arrival_time)?,
        length: parse("length", length)?,
        flow_id: parse("flow_id", flow_id)? as u64,
        weight: parse("weight", weight)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let record = parse_line("0.0 10.0 1 1.0").unwrap().unwrap();
        assert_eq!(
            record,
            PacketRecord {
                arrival_time: 0.0,
                length: 10.0,
                flow_id: 1,
                weight: 1.0,
            }
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# a comment").unwrap().is_none());
    }

    #[test]
    fn wrong_field_count_is_an_error() {
        assert!(matches!(
            parse_line("0.0 10.0 1"),
            Err(ParseError::WrongFieldCount { found: 3 })
        ));
    }

    #[test]
    fn non_numeric_field_is_an_error() {
        assert!(matches!(
            parse_line("zero 10.0 1 1.0"),
            Err(ParseError::InvalidNumber { field: "arrival_time", .. })
        ));
    }
}
