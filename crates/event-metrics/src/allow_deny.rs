//! Allow/deny list for metric family names.
//!
//! Exactly one of the two lists may be configured. Patterns are regular
//! expressions matched against the whole family name.

use regex::Regex;

use crate::error::AllowDenyError;

/// Answers whether a metric family may be emitted.
pub trait AllowDenyLister: Send + Sync {
    fn is_included(&self, family: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Allow,
    Deny,
}

/// Regex-backed allow or deny list.
#[derive(Debug, Clone)]
pub struct AllowDenyList {
    mode: Mode,
    patterns: Vec<Regex>,
    /// Patterns as configured, for [`AllowDenyList::status`].
    raw: Vec<String>,
}

impl AllowDenyList {
    /// Parse an allow list or a deny list.
    ///
    /// Both empty means every family is permitted.
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, AllowDenyError> {
        let (mode, raw) = match (allow.is_empty(), deny.is_empty()) {
            (false, false) => return Err(AllowDenyError::BothSet),
            (false, true) => (Mode::Allow, allow),
            (true, _) => (Mode::Deny, deny),
        };

        let patterns = raw
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|source| AllowDenyError::Pattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mode,
            patterns,
            raw: raw.to_vec(),
        })
    }

    /// A list that permits everything.
    pub fn permit_all() -> Self {
        Self {
            mode: Mode::Deny,
            patterns: Vec::new(),
            raw: Vec::new(),
        }
    }

    fn matches(&self, family: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(family))
    }

    /// One-line description for startup logging.
    pub fn status(&self) -> String {
        let patterns = self.raw.join(", ");
        match self.mode {
            Mode::Allow => format!("allowing the following metrics: {patterns}"),
            Mode::Deny if self.raw.is_empty() => "allowing all metrics".to_string(),
            Mode::Deny => format!("excluding the following metrics: {patterns}"),
        }
    }
}

impl AllowDenyLister for AllowDenyList {
    fn is_included(&self, family: &str) -> bool {
        match self.mode {
            Mode::Allow => self.matches(family),
            Mode::Deny => !self.matches(family),
        }
    }
}
