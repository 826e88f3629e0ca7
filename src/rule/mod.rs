//! # Persona Rules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | `Rule`, `Expr`, `Condition`, `Predicate` |
//! | `parse` | Rule documents (`{"conditions": ...}`) |
//! | `persona` | Flat `{"persona": {...}}` objects |
//! | `extract` | `RuleSet`, model-response cleanup, `RuleExtractor` |

pub mod ast;
mod parse;
mod persona;
pub mod extract;

pub use ast::{CompareOp, Condition, Expr, Predicate, Rule};
pub use extract::{RuleExtractor, RuleSet, clean_model_response};
