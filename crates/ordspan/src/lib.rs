#![forbid(unsafe_code)]

//! Interval map keyed by a mutable, reorderable finite domain.
//!
//! Classic interval containers assume a fixed, totally ordered key type.
//! `ordspan` handles the other case: the keys are application-defined
//! elements whose membership and relative order change over the program's
//! lifetime. A [`DomainRegistry`] owns the ordered elements and hands out
//! generation-checked [`Handle`]s; an [`IntervalMap`] associates values with
//! closed handle ranges and merges or splits entries under a selectable
//! [`MergePolicy`].
//!
//! The design goal is that a removed element can never be dereferenced:
//! handles are revalidated on every use ([`Error::InvalidHandle`]), and the
//! registry refuses to remove an element a map still references
//! ([`Error::HandleInUse`]). What would be silent memory corruption with
//! pointer-keyed intervals becomes a deterministic, recoverable error.
//!
//! # Example
//!
//! ```
//! use ordspan::{DomainRegistry, Interval, IntervalMap, MergePolicy};
//!
//! let mut reg = DomainRegistry::new();
//! let rows: Vec<_> = (0..5).map(|i| reg.push_back(i)).collect();
//!
//! let mut map = IntervalMap::new(&reg, MergePolicy::Splitting);
//! map.insert(&mut reg, Interval::new(rows[0], rows[3]), "even")?;
//! map.insert(&mut reg, Interval::point(rows[1]), "odd")?;
//!
//! let spans: Vec<_> = map.iter().map(|(_, v)| *v).collect();
//! assert_eq!(spans, ["even", "odd", "even"]);
//!
//! // The map pins its endpoints; the registry refuses to free them.
//! assert!(reg.remove(rows[1]).is_err());
//! # Ok::<(), ordspan::Error>(())
//! ```

pub mod domain;
pub mod error;
pub mod interval;
pub mod map;

pub use domain::{DomainRegistry, Handle, Position};
pub use error::{Error, Result};
pub use interval::Interval;
pub use map::{IntervalMap, MergePolicy, Query};
