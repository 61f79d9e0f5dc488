//! Family generators and the composer that folds them together.
//!
//! Each resource kind registers a static list of [`FamilyGenerator`]s. At
//! build time the list is filtered through the allow/deny list, its headers
//! are extracted once, and the survivors are composed into a
//! [`ComposedGenerator`] that renders every family for an object in
//! registration order.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::allow_deny::AllowDenyLister;
use crate::error::MetricError;
use crate::metric::{Family, MetricType};

/// Function turning one object into the family samples it contributes.
///
/// Returning an error marks the object as malformed; the caller skips it.
pub type GenerateFn<T> = fn(&T) -> Result<Family, MetricError>;

/// Static description of one metric family for a resource kind.
pub struct FamilyGenerator<T> {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub generate: GenerateFn<T>,
}

impl<T> FamilyGenerator<T> {
    pub const fn new(
        name: &'static str,
        metric_type: MetricType,
        help: &'static str,
        generate: GenerateFn<T>,
    ) -> Self {
        Self {
            name,
            metric_type,
            help,
            generate,
        }
    }

    pub fn header(&self) -> FamilyHeader {
        FamilyHeader {
            name: self.name,
            metric_type: self.metric_type,
            help: self.help,
        }
    }
}

impl<T> Clone for FamilyGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            metric_type: self.metric_type,
            help: self.help,
            generate: self.generate,
        }
    }
}

impl<T> fmt::Debug for FamilyGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyGenerator")
            .field("name", &self.name)
            .field("metric_type", &self.metric_type)
            .field("help", &self.help)
            .finish_non_exhaustive()
    }
}

/// `# HELP` / `# TYPE` information for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyHeader {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

impl FamilyHeader {
    /// Render the two-line header block.
    pub fn render(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} {}\n",
            self.name, self.help, self.name, self.metric_type
        )
    }
}

/// Drop every generator whose family name the allow/deny list rejects.
///
/// Order of the surviving generators is preserved.
pub fn filter_families<T>(
    allow_deny: &dyn AllowDenyLister,
    families: Vec<FamilyGenerator<T>>,
) -> Vec<FamilyGenerator<T>> {
    families
        .into_iter()
        .filter(|f| {
            let included = allow_deny.is_included(f.name);
            if !included {
                debug!(family = f.name, "metric family excluded by allow/deny list");
            }
            included
        })
        .collect()
}

/// Headers for every generator, independent of how many objects exist.
pub fn extract_headers<T>(families: &[FamilyGenerator<T>]) -> Vec<FamilyHeader> {
    families.iter().map(FamilyGenerator::header).collect()
}

/// Fold a generator list into one immutable per-object render function.
pub fn compose<T>(families: &[FamilyGenerator<T>]) -> ComposedGenerator<T> {
    ComposedGenerator {
        generators: families.iter().map(|f| (f.name, f.generate)).collect(),
    }
}

/// The composed generator: a fixed list of `(family name, generate fn)`.
///
/// Cheap to clone; the list itself is shared.
pub struct ComposedGenerator<T> {
    generators: Arc<[(&'static str, GenerateFn<T>)]>,
}

impl<T> ComposedGenerator<T> {
    /// Number of families this generator produces per object.
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Render one text chunk per family, in registration order.
    ///
    /// Chunk `i` belongs to header `i` of the same family list. Either every
    /// family renders or none does.
    pub fn render(&self, obj: &T) -> Result<Vec<String>, MetricError> {
        self.generators
            .iter()
            .map(|(name, f)| f(obj).map(|family| family.render(name)))
            .collect()
    }
}

impl<T> Clone for ComposedGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            generators: Arc::clone(&self.generators),
        }
    }
}

impl<T> fmt::Debug for ComposedGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.generators.iter().map(|(name, _)| name))
            .finish()
    }
}
