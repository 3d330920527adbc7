//! Closed intervals over domain handles.

use std::cmp::Ordering;

use crate::domain::{DomainRegistry, Handle};
use crate::error::Result;

/// A closed range `[lower, upper]` of domain elements.
///
/// An interval is a pair of handles and nothing more: it is meaningful only
/// relative to the registry that produced them, and only while both handles
/// are live. Construction never validates — every consuming operation
/// validates both endpoints first, so a stale interval fails loudly at use
/// time instead of being checked twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    lower: Handle,
    upper: Handle,
}

impl Interval {
    /// Build the closed interval `[lower, upper]`.
    ///
    /// If `upper` precedes `lower` under the registry's current order the
    /// interval is empty; that is a legal value, detected by
    /// [`Interval::is_empty`], never by a sentinel.
    #[must_use]
    pub fn new(lower: Handle, upper: Handle) -> Self {
        Self { lower, upper }
    }

    /// The single-element interval `[h, h]`.
    #[must_use]
    pub fn point(h: Handle) -> Self {
        Self { lower: h, upper: h }
    }

    /// Lower endpoint (inclusive).
    #[must_use]
    pub fn lower(&self) -> Handle {
        self.lower
    }

    /// Upper endpoint (inclusive).
    #[must_use]
    pub fn upper(&self) -> Handle {
        self.upper
    }

    /// Whether the interval covers no elements under the registry's current
    /// order: a single comparison, `upper < lower`.
    pub fn is_empty<V>(&self, registry: &DomainRegistry<V>) -> Result<bool> {
        Ok(registry.compare(self.upper, self.lower)? == Ordering::Less)
    }
}
