//! Stable public error codes.
//!
//! `get`-style lookups never error on "not found" — they return `None` — so this
//! enum only ever shows up as the `Err` side of fallible mutating operations.

use core::fmt;

/// Stable, `#[repr(i32)]` error codes for operations that can fail for a reason
/// other than "not found".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// An entity's handle was recycled; the caller's version is stale.
    EntityExpired = -1,
    /// A component to be added via `include` is already present in the archetype.
    ComponentAlreadyExists = -2,
    /// A component named for removal via `exclude` is not present.
    ComponentNotExists = -3,
    /// The requested component set cannot form a valid archetype.
    InvalidArchetype = -4,
    /// The archetype registry cannot hold any more distinct archetypes.
    ArchetypeCountOverflow = -5,
    /// An index passed to an accessor is out of range.
    IndexOverflow = -6,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCode::EntityExpired => "entity handle was recycled; reference is stale",
            ErrorCode::ComponentAlreadyExists => "component already present on archetype",
            ErrorCode::ComponentNotExists => "component not present on archetype",
            ErrorCode::InvalidArchetype => "component set cannot form a valid archetype",
            ErrorCode::ArchetypeCountOverflow => "archetype registry is full",
            ErrorCode::IndexOverflow => "index out of range",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ErrorCode {}

pub type Result<T> = core::result::Result<T, ErrorCode>;
