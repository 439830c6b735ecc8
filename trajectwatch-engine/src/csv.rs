//! Quoted-CSV codec for measurement logs.
//!
//! Every log starts with [`HEADER`] followed by one record per measurement.
//! Fields containing a comma, a double quote or a line break are wrapped in
//! double quotes with embedded quotes doubled. Absent metrics are written as
//! empty fields. The decoder is a character scanner so quoted delimiters and
//! quoted line breaks survive a round trip.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use trajectwatch_protocol::Measurement;

/// Column names, in the order they are written.
pub const HEADER: [&str; 7] = [
    "timestamp_iso",
    "duration_seconds",
    "distance_meters",
    "status",
    "origin",
    "destination",
    "mode",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no header line")]
    MissingHeader,
    #[error("log header lacks column {0}")]
    MissingColumn(&'static str),
}

/// The header line including its terminating newline.
pub fn header_line() -> String {
    encode_record(HEADER)
}

/// Quotes a single field when it contains a delimiter.
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Joins escaped fields into one newline-terminated line.
pub fn encode_record<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (idx, field) in fields.into_iter().enumerate() {
        if idx > 0 {
            line.push(',');
        }
        line.push_str(&escape_field(field.as_ref()));
    }
    line.push('\n');
    line
}

pub fn encode_measurement(measurement: &Measurement) -> String {
    let duration = measurement
        .duration_seconds
        .map(|value| value.to_string())
        .unwrap_or_default();
    let distance = measurement
        .distance_meters
        .map(|value| value.to_string())
        .unwrap_or_default();

    encode_record([
        measurement.timestamp_iso().as_str(),
        duration.as_str(),
        distance.as_str(),
        measurement.status.as_str(),
        measurement.origin.as_str(),
        measurement.destination.as_str(),
        measurement.mode.as_str(),
    ])
}

/// Splits a document into records of raw (unescaped) fields.
///
/// Blank lines are dropped. `\r\n` line endings are accepted. A quote opens a
/// quoted section wherever it appears in a field; inside a quoted section a
/// doubled quote is a literal quote and line breaks belong to the field.
pub fn parse_records(input: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut touched = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }

        match ch {
            ',' => {
                record.push(std::mem::take(&mut field));
                touched = true;
            }
            '"' => {
                in_quotes = true;
                touched = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if touched || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                touched = false;
            }
            other => field.push(other),
        }
    }

    if touched || !field.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

/// Decodes a whole log document into measurements, in file order.
///
/// Columns are located by header name. Rows whose timestamp cannot be parsed
/// are skipped; unparseable metrics read back as `None`.
pub fn decode_measurements(input: &str) -> Result<Vec<Measurement>, DecodeError> {
    let mut records = parse_records(input.trim_start_matches('\u{feff}')).into_iter();
    let header = records.next().ok_or(DecodeError::MissingHeader)?;

    let positions: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();

    let mut columns = [0usize; 7];
    for (slot, name) in columns.iter_mut().zip(HEADER) {
        *slot = *positions.get(name).ok_or(DecodeError::MissingColumn(name))?;
    }
    let [ts_col, duration_col, distance_col, status_col, origin_col, destination_col, mode_col] =
        columns;

    let mut measurements = Vec::new();
    for (row, record) in records.enumerate() {
        let field = |idx: usize| record.get(idx).map(String::as_str).unwrap_or("");

        let Some(timestamp) = parse_timestamp(field(ts_col)) else {
            debug!(row, value = field(ts_col), "skipping log row with invalid timestamp");
            continue;
        };

        measurements.push(Measurement {
            timestamp,
            duration_seconds: parse_metric(field(duration_col)),
            distance_meters: parse_metric(field(distance_col)),
            status: field(status_col).to_string(),
            origin: field(origin_col).to_string(),
            destination: field(destination_col).to_string(),
            mode: field(mode_col).to_string(),
        });
    }

    Ok(measurements)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Non-negative metric; fractional values are rounded, anything else is `None`.
pub fn parse_metric(raw: &str) -> Option<u64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}
