//! Error types for metric construction and family filtering.

use thiserror::Error;

/// Errors raised while building or rendering a metric.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("label keys and values differ in length: {keys} keys, {values} values")]
    LabelMismatch { keys: usize, values: usize },

    #[error("invalid label name: {0:?}")]
    InvalidLabelName(String),

    #[error("malformed object: {0}")]
    MalformedObject(String),
}

/// Errors raised while parsing an allow/deny list.
#[derive(Debug, Error)]
pub enum AllowDenyError {
    #[error("metric allowlist and denylist are both set; only one may be used")]
    BothSet,

    #[error("invalid metric pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
