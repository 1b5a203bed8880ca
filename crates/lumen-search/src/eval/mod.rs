//! Per-type predicate evaluators.
//!
//! Each module answers one question: do the values extracted from a resource
//! satisfy a clause's OR'd search values under the given modifier? Any
//! value-shape surprise is a non-match, never an error.

pub mod composite;
pub mod date;
pub mod number;
pub mod quantity;
pub mod reference;
pub mod string;
pub mod token;
pub mod uri;
