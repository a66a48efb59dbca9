//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use std::fmt;

/// A value that can be stored in a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    /// Written with the `i` suffix.
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}i"),
        }
    }
}

/// One point: a measurement, its tags, its fields and a nanosecond timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp_ns: Option<i128>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ns: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Adds the field only when a value is present.
    pub fn field_opt(self, key: impl Into<String>, value: Option<FieldValue>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    pub fn timestamp(mut self, timestamp_ns: i128) -> Self {
        self.timestamp_ns = Some(timestamp_ns);
        self
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encode as a single line. Returns `None` for a point without fields,
    /// which the line protocol cannot express.
    pub fn to_line(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);

        // tags sorted by key for canonical form
        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (key, value) in tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape_key(key), value))
            .collect();
        line.push_str(&fields.join(","));

        if let Some(ts) = self.timestamp_ns {
            line.push(' ');
            line.push_str(&ts.to_string());
        }

        Some(line)
    }
}

/// Spaces and commas must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
