//! Interval map over a mutable ordered domain.
//!
//! Entries associate a value with a closed range of [`DomainRegistry`]
//! elements. The map never owns or stores domain values — it holds only
//! [`Handle`]s and consults the registry for every ordering decision, and it
//! pins the endpoint handles of each stored entry so the registry refuses to
//! remove an element the map still depends on.
//!
//! # Representation
//!
//! Entries live in a `Vec` sorted by the lower endpoint's order label, with
//! a policy-specific non-overlap invariant. Each operation binary-searches
//! for the contiguous run of entries touching the probe interval, builds the
//! replacement run in a small buffer, and splices it in: O(log n + k)
//! comparisons for k touched entries, each comparison O(1) via order labels.
//!
//! # Teardown
//!
//! Dropping a map without calling [`IntervalMap::clear`] leaks its pins: the
//! registry cannot tell an abandoned pin from a live one, so the pinned
//! elements become unremovable. Clear the map first when retiring it.

use smallvec::SmallVec;

use crate::domain::{DomainRegistry, Handle};
use crate::error::{Error, Result};
use crate::interval::Interval;

/// How inserted ranges interact with existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Adjacent or overlapping entries with equal values always coalesce;
    /// overlapping different values are resolved by the combine function.
    Joining,
    /// Overlapping equal values coalesce, but entries that are merely
    /// adjacent stay distinct even when equal.
    Separating,
    /// Entries never merge; every boundary introduced by an insert or erase
    /// splits existing entries and persists, regardless of value equality.
    Splitting,
}

/// Combine function resolving the value where an insert overlaps existing
/// coverage under [`MergePolicy::Joining`].
type CombineFn<T> = Box<dyn Fn(&T, &T) -> T>;

struct Entry<T> {
    lower: Handle,
    upper: Handle,
    value: T,
}

/// Ordered map from closed handle intervals to values.
///
/// Bound to the registry it was constructed against; driving it with any
/// other registry fails with [`Error::RegistryMismatch`]. Every operation
/// validates its handles before mutating anything, so a failed call leaves
/// the map untouched.
pub struct IntervalMap<T> {
    registry_id: u64,
    policy: MergePolicy,
    combine: Option<CombineFn<T>>,
    entries: Vec<Entry<T>>,
}

impl<T: Clone + Eq> IntervalMap<T> {
    /// Create an empty map bound to `registry` under the given policy.
    pub fn new<V>(registry: &DomainRegistry<V>, policy: MergePolicy) -> Self {
        Self {
            registry_id: registry.id(),
            policy,
            combine: None,
            entries: Vec::new(),
        }
    }

    /// Install the combine function used where a Joining insert overlaps
    /// existing coverage. Without one, the new value wins.
    ///
    /// When a single insert overlaps several entries, `combine` is applied
    /// pairwise in ascending domain order; the result is order-sensitive
    /// unless the function is associative and commutative. That property is
    /// the caller's to supply — it is documented, not enforced.
    #[must_use]
    pub fn with_combine(mut self, combine: impl Fn(&T, &T) -> T + 'static) -> Self {
        self.combine = Some(Box::new(combine));
        self
    }

    /// The merge policy this map was configured with.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk all entries in ascending domain order.
    pub fn iter(&self) -> impl Iterator<Item = (Interval, &T)> {
        self.entries
            .iter()
            .map(|e| (Interval::new(e.lower, e.upper), &e.value))
    }

    /// Associate `value` with every element of `interval`.
    ///
    /// Gaps inside the interval get the new value. Where the interval
    /// overlaps an existing entry, the overlapped span gets
    /// `combine(old, new)` under Joining and the new value under Separating
    /// and Splitting; the uncovered remainders of partially covered entries
    /// survive, split at the interval's bounds. An empty interval is an
    /// accepted no-op. All-or-nothing: any error leaves the map unchanged.
    pub fn insert<V>(
        &mut self,
        reg: &mut DomainRegistry<V>,
        interval: Interval,
        value: T,
    ) -> Result<()> {
        self.check_registry(reg)?;
        let lo = reg.position(interval.lower())?;
        let hi = reg.position(interval.upper())?;
        if hi < lo {
            return Ok(());
        }

        let mut first = self.entries.partition_point(|e| bounds(reg, e).1 < lo);
        let mut last = self.entries.partition_point(|e| bounds(reg, e).0 <= hi);

        let mut out: SmallVec<[Entry<T>; 4]> = SmallVec::new();

        // Uncovered remainder of the first touched entry, left of the probe.
        if first < last {
            let head = &self.entries[first];
            if bounds(reg, head).0 < lo {
                out.push(Entry {
                    lower: head.lower,
                    upper: before(reg, interval.lower()),
                    value: head.value.clone(),
                });
            }
        }

        // Cover [lo, hi]: alternate gap pieces (new value) and overlap
        // pieces (policy-resolved value) in ascending order.
        let mut gap_lower = interval.lower();
        let mut gap_lower_pos = lo;
        let mut covered_to_end = false;
        for e in &self.entries[first..last] {
            let (elo, ehi) = bounds(reg, e);
            if elo > gap_lower_pos {
                out.push(Entry {
                    lower: gap_lower,
                    upper: before(reg, e.lower),
                    value: value.clone(),
                });
            }
            let ov_lower = if elo < lo { interval.lower() } else { e.lower };
            let (ov_upper, ov_upper_pos) = if ehi > hi {
                (interval.upper(), hi)
            } else {
                (e.upper, ehi)
            };
            let ov_value = match self.policy {
                MergePolicy::Joining => self.combined(&e.value, &value),
                MergePolicy::Separating | MergePolicy::Splitting => value.clone(),
            };
            out.push(Entry {
                lower: ov_lower,
                upper: ov_upper,
                value: ov_value,
            });
            if ov_upper_pos >= hi {
                covered_to_end = true;
            } else {
                gap_lower = after(reg, ov_upper);
                gap_lower_pos = pos(reg, gap_lower);
            }
        }
        if !covered_to_end {
            out.push(Entry {
                lower: gap_lower,
                upper: interval.upper(),
                value: value.clone(),
            });
        }

        // Uncovered remainder of the last touched entry, right of the probe.
        if first < last {
            let tail = &self.entries[last - 1];
            if bounds(reg, tail).1 > hi {
                out.push(Entry {
                    lower: after(reg, interval.upper()),
                    upper: tail.upper,
                    value: tail.value.clone(),
                });
            }
        }

        // Pieces in `out` are pairwise adjacent by construction, so merging
        // is a value-equality scan.
        match self.policy {
            MergePolicy::Splitting => {}
            MergePolicy::Separating => coalesce_run(&mut out),
            MergePolicy::Joining => {
                coalesce_run(&mut out);
                if first > 0 {
                    let left = &self.entries[first - 1];
                    if left.value == out[0].value && adjacent(reg, left.upper, out[0].lower) {
                        out[0].lower = left.lower;
                        first -= 1;
                    }
                }
                if last < self.entries.len() {
                    let right = &self.entries[last];
                    let end = out.len() - 1;
                    if right.value == out[end].value && adjacent(reg, out[end].upper, right.lower)
                    {
                        out[end].upper = right.upper;
                        last += 1;
                    }
                }
            }
        }

        self.splice(reg, first..last, out);
        self.debug_check(reg);
        Ok(())
    }

    /// Remove coverage strictly inside `interval`.
    ///
    /// Entries partially covered are split at the interval's bounds and
    /// their uncovered remainders preserved. No policy merges on erase.
    pub fn erase<V>(&mut self, reg: &mut DomainRegistry<V>, interval: Interval) -> Result<()> {
        self.check_registry(reg)?;
        let lo = reg.position(interval.lower())?;
        let hi = reg.position(interval.upper())?;
        if hi < lo {
            return Ok(());
        }

        let first = self.entries.partition_point(|e| bounds(reg, e).1 < lo);
        let last = self.entries.partition_point(|e| bounds(reg, e).0 <= hi);
        if first == last {
            return Ok(());
        }

        let mut out: SmallVec<[Entry<T>; 4]> = SmallVec::new();
        let head = &self.entries[first];
        if bounds(reg, head).0 < lo {
            out.push(Entry {
                lower: head.lower,
                upper: before(reg, interval.lower()),
                value: head.value.clone(),
            });
        }
        let tail = &self.entries[last - 1];
        if bounds(reg, tail).1 > hi {
            out.push(Entry {
                lower: after(reg, interval.upper()),
                upper: tail.upper,
                value: tail.value.clone(),
            });
        }

        self.splice(reg, first..last, out);
        self.debug_check(reg);
        Ok(())
    }

    /// Entries overlapping `interval`, in ascending domain order.
    ///
    /// The bounds are resolved up front; items are yielded lazily. The
    /// iterator is finite and restartable — re-querying walks from scratch,
    /// no cursor state survives between calls.
    pub fn query<'a, V>(
        &'a self,
        reg: &DomainRegistry<V>,
        interval: Interval,
    ) -> Result<Query<'a, T>> {
        self.check_registry(reg)?;
        let lo = reg.position(interval.lower())?;
        let hi = reg.position(interval.upper())?;
        if hi < lo {
            return Ok(Query {
                inner: self.entries[..0].iter(),
            });
        }
        let first = self.entries.partition_point(|e| bounds(reg, e).1 < lo);
        let last = self.entries.partition_point(|e| bounds(reg, e).0 <= hi);
        Ok(Query {
            inner: self.entries[first..last].iter(),
        })
    }

    /// Entries overlapping the single element `h`.
    pub fn query_at<'a, V>(&'a self, reg: &DomainRegistry<V>, h: Handle) -> Result<Query<'a, T>> {
        self.query(reg, Interval::point(h))
    }

    /// The value covering element `h`, if any.
    pub fn get<'a, V>(&'a self, reg: &DomainRegistry<V>, h: Handle) -> Result<Option<&'a T>> {
        let mut hits = self.query_at(reg, h)?;
        Ok(hits.next().map(|(_, value)| value))
    }

    /// Drop all entries and release their pins on the registry.
    pub fn clear<V>(&mut self, reg: &mut DomainRegistry<V>) -> Result<()> {
        self.check_registry(reg)?;
        for e in &self.entries {
            reg.unpin(e.lower);
            reg.unpin(e.upper);
        }
        self.entries.clear();
        Ok(())
    }

    // ── Internal helpers ──────────────────────────────────────────

    fn check_registry<V>(&self, reg: &DomainRegistry<V>) -> Result<()> {
        if reg.id() == self.registry_id {
            Ok(())
        } else {
            Err(Error::RegistryMismatch)
        }
    }

    fn combined(&self, old: &T, new: &T) -> T {
        match &self.combine {
            Some(f) => f(old, new),
            None => new.clone(),
        }
    }

    /// Replace `range` with `out`, keeping pin counts in step. New handles
    /// are pinned before displaced ones are released, so a shared endpoint's
    /// count never transits through zero mid-call.
    fn splice<V>(
        &mut self,
        reg: &mut DomainRegistry<V>,
        range: std::ops::Range<usize>,
        out: SmallVec<[Entry<T>; 4]>,
    ) {
        for e in &out {
            reg.pin(e.lower);
            reg.pin(e.upper);
        }
        for e in &self.entries[range.clone()] {
            reg.unpin(e.lower);
            reg.unpin(e.upper);
        }
        let removed = range.len();
        let produced = out.len();
        self.entries.splice(range, out);
        tracing::trace!(policy = ?self.policy, removed, produced, "rewrote entry run");
    }

    /// Policy invariants, checked after every mutation in debug builds.
    /// A failure here is a bug in the map, not a user error.
    fn debug_check<V>(&self, reg: &DomainRegistry<V>) {
        if !cfg!(debug_assertions) {
            return;
        }
        let mut prev: Option<(u64, &Entry<T>)> = None;
        for e in &self.entries {
            let (elo, ehi) = bounds(reg, e);
            debug_assert!(elo <= ehi, "entry covers at least one element");
            if let Some((prev_hi, prev_entry)) = prev {
                debug_assert!(prev_hi < elo, "entries are sorted and disjoint");
                if self.policy == MergePolicy::Joining {
                    debug_assert!(
                        !(prev_entry.value == e.value && adjacent(reg, prev_entry.upper, e.lower)),
                        "joining map holds no adjacent equal-valued entries"
                    );
                }
            }
            prev = Some((ehi, e));
        }
    }
}

impl<T> std::fmt::Debug for IntervalMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalMap")
            .field("policy", &self.policy)
            .field("entries", &self.entries.len())
            .field("combine", &self.combine.is_some())
            .finish()
    }
}

/// Lazy result of [`IntervalMap::query`]: overlapping entries in ascending
/// domain order.
pub struct Query<'a, T> {
    inner: std::slice::Iter<'a, Entry<T>>,
}

impl<'a, T> Iterator for Query<'a, T> {
    type Item = (Interval, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.inner.next()?;
        Some((Interval::new(e.lower, e.upper), &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Query<'_, T> {}

impl<T> std::fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

/// Order-label bounds of a stored entry. Stored endpoints are pinned, so
/// they are live by invariant.
fn bounds<V, T>(reg: &DomainRegistry<V>, e: &Entry<T>) -> (u64, u64) {
    (pos(reg, e.lower), pos(reg, e.upper))
}

fn pos<V>(reg: &DomainRegistry<V>, h: Handle) -> u64 {
    reg.position(h).expect("stored or derived handle is live")
}

/// The element immediately before `h`. Only called for boundaries with at
/// least one element on their left.
fn before<V>(reg: &DomainRegistry<V>, h: Handle) -> Handle {
    reg.predecessor(h)
        .ok()
        .flatten()
        .expect("interior boundary has a predecessor")
}

/// The element immediately after `h`. Only called for boundaries with at
/// least one element on their right.
fn after<V>(reg: &DomainRegistry<V>, h: Handle) -> Handle {
    reg.successor(h)
        .ok()
        .flatten()
        .expect("interior boundary has a successor")
}

fn adjacent<V>(reg: &DomainRegistry<V>, a_upper: Handle, b_lower: Handle) -> bool {
    reg.successor(a_upper).ok().flatten() == Some(b_lower)
}

/// Merge consecutive equal-valued pieces of a pairwise-adjacent run.
fn coalesce_run<T: Eq>(out: &mut SmallVec<[Entry<T>; 4]>) {
    let mut i = 0;
    while i + 1 < out.len() {
        if out[i].value == out[i + 1].value {
            out[i].upper = out[i + 1].upper;
            out.remove(i + 1);
        } else {
            i += 1;
        }
    }
}
