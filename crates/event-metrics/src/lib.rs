//! event-metrics: metric families for the kube event exporter.
//!
//! Holds the leaf data model (metrics, families, family headers), the
//! generator composer that folds a kind's family generators into a single
//! per-object render function, and the allow/deny list that decides which
//! families are emitted at all.
//!
//! # Architecture
//!
//! ```text
//! [FamilyGenerator<T>] (static, per resource kind)
//!   ├── filter_families(allow_deny) → permitted generators
//!   ├── extract_headers()            → # HELP / # TYPE block
//!   └── compose()                    → ComposedGenerator<T>
//!                                        └── render(&T) → one text chunk per family
//! ```
//!
//! Denied families are removed before headers are extracted, so a denied
//! family leaves no trace in the exposition output.

pub mod allow_deny;
pub mod error;
pub mod generator;
pub mod metric;

pub use allow_deny::{AllowDenyList, AllowDenyLister};
pub use error::{AllowDenyError, MetricError};
pub use generator::{
    compose, extract_headers, filter_families, ComposedGenerator, FamilyGenerator, FamilyHeader,
    GenerateFn,
};
pub use metric::{Family, Metric, MetricType};
