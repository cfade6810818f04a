//! Chatdesk Core - Data Types
//!
//! Shared vocabulary for the data access layer: identifiers, the cache key
//! naming table, store row projections, variable resolution and errors.
//! No I/O happens in this crate.

mod config;
mod enums;
mod error;
mod keys;
mod rows;
mod variables;

pub use config::*;
pub use enums::*;
pub use error::*;
pub use keys::*;
pub use rows::*;
pub use variables::*;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Relational primary key.
pub type EntityId = i64;

/// Path addressing the root of a JSON cache document.
pub const JSON_ROOT_PATH: &str = ".";
