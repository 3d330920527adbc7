//! Mutable ordered domain: a slot arena with generation-checked handles and
//! an order-maintenance list.
//!
//! The registry owns the elements. Clients only ever hold [`Handle`]s, which
//! stay cheap `Copy` values and are revalidated on every dereference, so a
//! removed element can never be reached again — staleness surfaces as
//! [`Error::InvalidHandle`] instead of reading freed storage.
//!
//! # Ordering
//!
//! Elements form an intrusive doubly linked list (the application's intended
//! order) and each carries a `u64` order label. Labels are assigned by
//! midpoint on insertion; when a gap closes, the whole list is relabeled at
//! an even stride. That makes [`DomainRegistry::compare`] a constant-time
//! label comparison after the generation checks, with relabeling amortized
//! O(1) per insertion. The registry never reorders elements on its own:
//! changing an element's position is remove-then-reinsert, which also
//! invalidates outstanding handles to it — exactly the point.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{Error, Result};

/// Distance between labels after a full relabel; also the first label.
const LABEL_STRIDE: u64 = 1 << 32;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, generation-checked reference to a domain element.
///
/// A handle is equality-comparable and hashable, but carries no order of its
/// own: relative order is a property of the registry's current sequence and
/// is only available through [`DomainRegistry::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: u32,
    generation: u32,
}

impl Handle {
    /// Raw slot index, for asserting reuse behavior.
    #[cfg(test)]
    pub(crate) fn slot(self) -> u32 {
        self.slot
    }
}

/// Insertion anchor for [`DomainRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before every live element.
    Front,
    /// After every live element.
    Back,
    /// Immediately before the referenced element.
    Before(Handle),
    /// Immediately after the referenced element.
    After(Handle),
}

/// A live element: the application value plus intrusive order state.
struct Element<V> {
    value: V,
    label: u64,
    prev: Option<u32>,
    next: Option<u32>,
    /// References held by interval map entries. Removal is refused while
    /// this is non-zero.
    pins: u32,
}

enum SlotState<V> {
    Vacant { next_free: Option<u32> },
    Occupied(Element<V>),
}

struct Slot<V> {
    generation: u32,
    state: SlotState<V>,
}

/// The ordered, mutable domain of elements usable as interval endpoints.
///
/// Single-threaded by design: no interior locking, no suspension points.
/// Callers sharing a registry across threads must serialize access
/// externally, as with any shared mutable structure.
pub struct DomainRegistry<V> {
    id: u64,
    slots: Vec<Slot<V>>,
    free_head: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    relabels: u64,
}

impl<V> DomainRegistry<V> {
    /// Create an empty registry with a process-unique identity.
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, AtomicOrdering::Relaxed),
            slots: Vec::new(),
            free_head: None,
            head: None,
            tail: None,
            len: 0,
            relabels: 0,
        }
    }

    /// Process-unique registry identity. Interval maps record this at
    /// construction and refuse any other registry.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the domain has no live elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a new element at the given position.
    ///
    /// Fails with [`Error::InvalidHandle`] if a `Before`/`After` anchor is
    /// stale. Existing handles remain valid and their relative order is
    /// unaffected.
    pub fn insert(&mut self, value: V, at: Position) -> Result<Handle> {
        let (prev, next) = match at {
            Position::Front => (None, self.head),
            Position::Back => (self.tail, None),
            Position::Before(h) => {
                let el = self.element(h)?;
                (el.prev, Some(h.slot))
            }
            Position::After(h) => {
                let el = self.element(h)?;
                (Some(h.slot), el.next)
            }
        };

        let label = self.label_between(prev, next);
        let handle = self.alloc(Element {
            value,
            label,
            prev,
            next,
            pins: 0,
        });

        match prev {
            Some(p) => self.element_at_mut(p).next = Some(handle.slot),
            None => self.head = Some(handle.slot),
        }
        match next {
            Some(n) => self.element_at_mut(n).prev = Some(handle.slot),
            None => self.tail = Some(handle.slot),
        }
        self.len += 1;
        Ok(handle)
    }

    /// Insert at the front. Infallible shorthand for `insert(.., Front)`.
    pub fn push_front(&mut self, value: V) -> Handle {
        self.insert(value, Position::Front)
            .expect("front insertion takes no handle")
    }

    /// Insert at the back. Infallible shorthand for `insert(.., Back)`.
    pub fn push_back(&mut self, value: V) -> Handle {
        self.insert(value, Position::Back)
            .expect("back insertion takes no handle")
    }

    /// Remove an element and return its value.
    ///
    /// Fails with [`Error::InvalidHandle`] if the handle is stale, or with
    /// [`Error::HandleInUse`] if any interval map entry still references the
    /// element — erase those entries first, then retry. On success the
    /// handle (and every copy of it) becomes permanently invalid.
    pub fn remove(&mut self, h: Handle) -> Result<V> {
        let el = self.element(h)?;
        if el.pins > 0 {
            return Err(Error::HandleInUse { pins: el.pins });
        }
        let (prev, next) = (el.prev, el.next);

        match prev {
            Some(p) => self.element_at_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.element_at_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let slot = &mut self.slots[h.slot as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let state = std::mem::replace(
            &mut slot.state,
            SlotState::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(h.slot);
        self.len -= 1;

        match state {
            SlotState::Occupied(el) => Ok(el.value),
            SlotState::Vacant { .. } => unreachable!("validated slot was occupied"),
        }
    }

    /// Read the element's value.
    pub fn get(&self, h: Handle) -> Result<&V> {
        Ok(&self.element(h)?.value)
    }

    /// Mutate the element's value in place.
    ///
    /// In-place mutation is allowed precisely because it cannot change the
    /// element's relative order; reordering requires remove-then-reinsert.
    pub fn get_mut(&mut self, h: Handle) -> Result<&mut V> {
        Ok(&mut self.element_mut(h)?.value)
    }

    /// Whether the handle still denotes a live element.
    #[must_use]
    pub fn contains(&self, h: Handle) -> bool {
        self.element(h).is_ok()
    }

    /// Relative order of two live elements under the current sequence.
    pub fn compare(&self, a: Handle, b: Handle) -> Result<Ordering> {
        let la = self.element(a)?.label;
        let lb = self.element(b)?.label;
        Ok(la.cmp(&lb))
    }

    /// The element immediately after `h`, or `Ok(None)` at the back edge.
    pub fn successor(&self, h: Handle) -> Result<Option<Handle>> {
        Ok(self.element(h)?.next.map(|idx| self.handle_at(idx)))
    }

    /// The element immediately before `h`, or `Ok(None)` at the front edge.
    pub fn predecessor(&self, h: Handle) -> Result<Option<Handle>> {
        Ok(self.element(h)?.prev.map(|idx| self.handle_at(idx)))
    }

    /// Walk all live elements in ascending order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    /// Current order label of a live element. Labels are only meaningful
    /// until the next insertion (which may relabel), so callers snapshot
    /// them within a single operation.
    pub(crate) fn position(&self, h: Handle) -> Result<u64> {
        Ok(self.element(h)?.label)
    }

    /// Record an interval map reference to the element.
    ///
    /// Callers guarantee the handle was validated in the same operation.
    pub(crate) fn pin(&mut self, h: Handle) {
        let el = self
            .element_mut(h)
            .expect("pinned handles are validated before pinning");
        el.pins += 1;
    }

    /// Release an interval map reference to the element.
    pub(crate) fn unpin(&mut self, h: Handle) {
        let el = self
            .element_mut(h)
            .expect("a pinned element cannot have been removed");
        debug_assert!(el.pins > 0, "unpin without matching pin");
        el.pins -= 1;
    }

    // ── Internal helpers ──────────────────────────────────────────

    fn element(&self, h: Handle) -> Result<&Element<V>> {
        let stale = Error::InvalidHandle {
            slot: h.slot,
            generation: h.generation,
        };
        let slot = self.slots.get(h.slot as usize).ok_or(stale)?;
        if slot.generation != h.generation {
            return Err(stale);
        }
        match &slot.state {
            SlotState::Occupied(el) => Ok(el),
            SlotState::Vacant { .. } => Err(stale),
        }
    }

    fn element_mut(&mut self, h: Handle) -> Result<&mut Element<V>> {
        let stale = Error::InvalidHandle {
            slot: h.slot,
            generation: h.generation,
        };
        let slot = self.slots.get_mut(h.slot as usize).ok_or(stale)?;
        if slot.generation != h.generation {
            return Err(stale);
        }
        match &mut slot.state {
            SlotState::Occupied(el) => Ok(el),
            SlotState::Vacant { .. } => Err(stale),
        }
    }

    /// Direct access to an occupied slot reached through intrusive links.
    fn element_at(&self, idx: u32) -> &Element<V> {
        match &self.slots[idx as usize].state {
            SlotState::Occupied(el) => el,
            SlotState::Vacant { .. } => unreachable!("linked slot is occupied"),
        }
    }

    fn element_at_mut(&mut self, idx: u32) -> &mut Element<V> {
        match &mut self.slots[idx as usize].state {
            SlotState::Occupied(el) => el,
            SlotState::Vacant { .. } => unreachable!("linked slot is occupied"),
        }
    }

    fn handle_at(&self, idx: u32) -> Handle {
        Handle {
            slot: idx,
            generation: self.slots[idx as usize].generation,
        }
    }

    fn alloc(&mut self, element: Element<V>) -> Handle {
        if let Some(idx) = self.free_head {
            let slot = &mut self.slots[idx as usize];
            self.free_head = match &slot.state {
                SlotState::Vacant { next_free } => *next_free,
                SlotState::Occupied(_) => unreachable!("free list holds vacant slots"),
            };
            slot.state = SlotState::Occupied(element);
            Handle {
                slot: idx,
                generation: slot.generation,
            }
        } else {
            let idx = u32::try_from(self.slots.len()).expect("slot capacity exceeded");
            self.slots.push(Slot {
                generation: 0,
                state: SlotState::Occupied(element),
            });
            Handle {
                slot: idx,
                generation: 0,
            }
        }
    }

    /// Label for a new element between two (optional) neighbors, relabeling
    /// the whole list first if the gap has closed.
    fn label_between(&mut self, prev: Option<u32>, next: Option<u32>) -> u64 {
        if let Some(label) = self.try_label_between(prev, next) {
            return label;
        }
        self.relabel();
        self.try_label_between(prev, next)
            .expect("relabel opens a gap at every position")
    }

    fn try_label_between(&self, prev: Option<u32>, next: Option<u32>) -> Option<u64> {
        match (prev, next) {
            (None, None) => Some(LABEL_STRIDE),
            (None, Some(n)) => {
                let ln = self.element_at(n).label;
                (ln >= 2).then(|| ln / 2)
            }
            (Some(p), None) => self.element_at(p).label.checked_add(LABEL_STRIDE),
            (Some(p), Some(n)) => {
                let lp = self.element_at(p).label;
                let ln = self.element_at(n).label;
                (ln - lp >= 2).then(|| lp + (ln - lp) / 2)
            }
        }
    }

    fn relabel(&mut self) {
        self.relabels += 1;
        tracing::debug!(
            len = self.len,
            relabels = self.relabels,
            "order label gap closed; relabeling"
        );
        let mut cursor = self.head;
        let mut label = LABEL_STRIDE;
        while let Some(idx) = cursor {
            let el = self.element_at_mut(idx);
            el.label = label;
            cursor = el.next;
            label += LABEL_STRIDE;
        }
    }
}

impl<V> Default for DomainRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for DomainRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("relabels", &self.relabels)
            .finish()
    }
}

/// Ascending-order iterator over live elements. See [`DomainRegistry::iter`].
pub struct Iter<'a, V> {
    registry: &'a DomainRegistry<V>,
    cursor: Option<u32>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Handle, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let el = self.registry.element_at(idx);
        self.cursor = el.next;
        Some((self.registry.handle_at(idx), &el.value))
    }
}
