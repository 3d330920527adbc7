use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry and the interval map.
///
/// Every operation validates before it mutates, so an `Err` always leaves
/// both structures exactly as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The handle's generation no longer matches a live element. Raised by
    /// any operation that would dereference the handle.
    #[error("invalid handle: slot {slot} generation {generation} no longer denotes a live element")]
    InvalidHandle { slot: u32, generation: u32 },

    /// Removal was refused because one or more interval map entries still
    /// reference the element. Erase the referencing entries first.
    #[error("element is still referenced by an interval map ({pins} pinned reference(s))")]
    HandleInUse { pins: u32 },

    /// An interval map was driven with a registry other than the one it was
    /// constructed against.
    #[error("interval map was built against a different registry")]
    RegistryMismatch,
}
