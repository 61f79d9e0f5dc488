//! Metric model and Prometheus text rendering.
//!
//! A [`Metric`] is one sample (label set + value). A [`Family`] is the
//! ordered set of samples one object contributes to a named metric family.
//! Both are immutable once constructed.

use std::fmt;
use std::fmt::Write as _;

use crate::error::MetricError;

/// Prometheus metric type advertised in the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Counter,
    Info,
    StateSet,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Info => "info",
            MetricType::StateSet => "stateset",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sample: positional label keys/values and a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    label_keys: Vec<String>,
    label_values: Vec<String>,
    value: f64,
}

impl Metric {
    /// Build a metric, validating that keys and values line up and that
    /// every key is a legal Prometheus label name.
    pub fn new<K, V>(label_keys: K, label_values: V, value: f64) -> Result<Self, MetricError>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let label_keys: Vec<String> = label_keys.into_iter().map(Into::into).collect();
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();

        if label_keys.len() != label_values.len() {
            return Err(MetricError::LabelMismatch {
                keys: label_keys.len(),
                values: label_values.len(),
            });
        }
        if let Some(bad) = label_keys.iter().find(|k| !is_valid_label_name(k)) {
            return Err(MetricError::InvalidLabelName(bad.clone()));
        }

        Ok(Self {
            label_keys,
            label_values,
            value,
        })
    }

    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Append `name{k="v",...} value\n` to `out`.
    pub fn write_to(&self, name: &str, out: &mut String) {
        out.push_str(name);
        if !self.label_keys.is_empty() {
            out.push('{');
            for (i, (k, v)) in self.label_keys.iter().zip(&self.label_values).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push_str("=\"");
                escape_label_value(v, out);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        write_value(self.value, out);
        out.push('\n');
    }
}

/// The samples one object contributes to one family.
///
/// An empty family is valid: the object currently contributes nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Family {
    metrics: Vec<Metric>,
}

impl Family {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Render every sample of this family under the given family name.
    pub fn render(&self, name: &str) -> String {
        let mut out = String::new();
        for m in &self.metrics {
            m.write_to(name, &mut out);
        }
        out
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape_label_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn write_value(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("NaN");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { "+Inf" } else { "-Inf" });
    } else {
        let _ = write!(out, "{value}");
    }
}
