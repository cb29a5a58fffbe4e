//! Model adapters.
//!
//! A [`ModelAdapter`] is the generated, per-record-type mapping between a
//! typed record and its stored columns. The runtime wraps it in a
//! [`ModelBinding`] that validates the declaration, applies type converters
//! and renders the SQL the persistence layer executes.

mod column;
mod model;
mod predicate;
pub(crate) mod statement;

pub use column::{ColumnDef, ColumnType, ScalarKind};
pub use model::{AdapterShape, ModelAdapter, ModelBinding, ShapeKind};
pub use predicate::Predicate;
pub use statement::{quote_ident, Statement};

pub(crate) use model::is_unset;
