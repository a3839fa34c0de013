//! Check registry and rule evaluation for warehouse validation.
//!
//! Checks are data: a name, a SQL template and an [`EvaluationRule`]. The
//! registry is built from a [`WarehouseSchema`] and can be validated without
//! touching a database.

pub mod registry;
pub mod rule;
pub mod schema;
pub mod types;

pub use registry::*;
pub use rule::*;
pub use schema::*;
pub use types::*;
