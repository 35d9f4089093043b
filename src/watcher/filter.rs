//! Job filter evaluation
//!
//! A job filter has three independent dimensions (events, buckets, objects).
//! A dimension passes when its pattern list is empty, contains the `"*"`
//! wildcard, or has any pattern whose regex finds a match anywhere in the
//! record field. A job is selected only when all three dimensions pass.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::watcher::event::CanonicalEventRecord;

/// Universal wildcard pattern.
pub const WILDCARD: &str = "*";

/// Declarative filter as written in the job table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Event name patterns
    #[serde(default)]
    pub events: Vec<String>,

    /// Bucket name patterns
    #[serde(default)]
    pub buckets: Vec<String>,

    /// Object key patterns
    #[serde(default)]
    pub objects: Vec<String>,
}

impl JobFilter {
    /// Compile the filter for one dispatch pass.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            events: FilterDimension::compile("events", &self.events),
            buckets: FilterDimension::compile("buckets", &self.buckets),
            objects: FilterDimension::compile("objects", &self.objects),
        }
    }

    /// Human-readable summary for logging.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.events.is_empty() {
            parts.push(format!("events~{}", self.events.join(",")));
        }

        if !self.buckets.is_empty() {
            parts.push(format!("buckets~{}", self.buckets.join(",")));
        }

        if !self.objects.is_empty() {
            parts.push(format!("objects~{}", self.objects.join(",")));
        }

        if parts.is_empty() {
            "no filters (all events)".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// One filter dimension with its patterns compiled.
#[derive(Debug, Clone)]
pub enum FilterDimension {
    /// Empty list or wildcard present; every value passes
    Any,
    /// Value passes if any pattern matches
    Patterns(Vec<Regex>),
}

impl FilterDimension {
    /// Compile a pattern list.
    ///
    /// Patterns that are not valid regular expressions are logged and left
    /// out; they can never match. A list made only of invalid patterns
    /// therefore rejects every value rather than accepting it.
    pub fn compile(dimension: &'static str, patterns: &[String]) -> Self {
        if patterns.is_empty() || patterns.iter().any(|p| p == WILDCARD) {
            return FilterDimension::Any;
        }

        let compiled = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(
                        dimension = dimension,
                        pattern = %pattern,
                        error = %e,
                        "Ignoring invalid filter pattern"
                    );
                    None
                }
            })
            .collect();

        FilterDimension::Patterns(compiled)
    }

    /// Whether `value` passes this dimension.
    pub fn passes(&self, value: &str) -> bool {
        match self {
            FilterDimension::Any => true,
            FilterDimension::Patterns(patterns) => patterns.iter().any(|re| re.is_match(value)),
        }
    }
}

/// A job filter ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    events: FilterDimension,
    buckets: FilterDimension,
    objects: FilterDimension,
}

impl CompiledFilter {
    /// Whether the record is accepted by all three dimensions.
    pub fn matches(&self, record: &CanonicalEventRecord) -> bool {
        self.events.passes(record.event_name())
            && self.buckets.passes(record.bucket())
            && self.objects.passes(record.object_key())
    }
}
