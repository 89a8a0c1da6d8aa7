//! Rendering of records into terminal lines.

use std::borrow::Cow;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use crate::metrics_consts::JSON_FALLBACKS;
use crate::record::Record;

/// Presentation switches, handed to every component that renders records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub pretty_json: bool,
    pub color: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            pretty_json: true,
            color: true,
        }
    }
}

/// Render one record as a single display string, without a trailing newline.
///
/// Never fails: a payload that is not JSON (or not UTF-8) is shown as-is.
/// With `color` set, fields are colored when the terminal supports it;
/// `colored` drops the escapes otherwise.
pub fn format_record(record: &Record, options: &FormatOptions) -> String {
    let value = render_value(&record.payload, options.pretty_json);
    let value: &str = &value;
    let timestamp = render_timestamp(record.timestamp);

    if options.color {
        line(
            record.topic.as_str().cyan(),
            record.partition,
            record.offset.to_string().as_str().cyan(),
            timestamp.as_str().cyan(),
            value.cyan(),
        )
    } else {
        line(
            &record.topic,
            record.partition,
            record.offset,
            timestamp,
            value,
        )
    }
}

/// Re-indent a JSON document with one tab per nesting level.
///
/// Returns `None` when the payload does not parse. Object key order and
/// number spelling are kept as they appear in the payload.
pub fn indent_json(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;

    let mut out = Vec::with_capacity(payload.len() * 2);
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer).ok()?;

    String::from_utf8(out).ok()
}

fn render_value(payload: &[u8], pretty_json: bool) -> Cow<'_, str> {
    if pretty_json {
        if let Some(indented) = indent_json(payload) {
            return Cow::Owned(format!("\n{indented}"));
        }
        metrics::counter!(JSON_FALLBACKS).increment(1);
    }
    String::from_utf8_lossy(payload)
}

fn render_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f %z UTC").to_string(),
        None => "-".to_string(),
    }
}

fn line(
    topic: impl Display,
    partition: i32,
    offset: impl Display,
    timestamp: impl Display,
    value: impl Display,
) -> String {
    format!(
        "Received message - topic: {topic}, partition: {partition}, offset: {offset}, timestamp: {timestamp}, value: {value}"
    )
}
