//! # Persona Graph Model
//!
//! Plain DTOs shared by the builder, the semantic index and the evaluator.
//!
//! Pure data. Nothing in here does I/O or holds state.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId, NodeKind};
pub use relationship::{Relationship, RelId};
pub use value::Value;
pub use property_map::PropertyMap;
