//! Foundation types for the Arbor graph container.
//!
//! Everything here is identity plumbing shared by every other crate:
//! integer ids assigned by the symbol table, and the opaque handle under
//! which the engine moves domain objects around without interpreting them.

pub mod ids;
pub mod object;

pub use ids::{BranchGraphId, SymbolId};
pub use object::{object_key, GraphObject, ObjectKey};
