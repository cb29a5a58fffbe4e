//! Typed records and their runtime identity.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A domain entity persisted to a table, view or join.
///
/// `Default` provides the logically-empty record a container yields before
/// it has any data.
pub trait Model: Any + Send + Sync + Default + fmt::Debug {}

/// Runtime identity of a record type.
///
/// Equality and hashing use the [`TypeId`]; the name is kept for messages.
#[derive(Clone, Copy)]
pub struct RecordType {
    id: TypeId,
    name: &'static str,
}

impl RecordType {
    /// The record type of `M`.
    pub fn of<M: Model>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    /// The underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified Rust type name.
    pub fn full_name(&self) -> &'static str {
        self.name
    }

    /// Unqualified type name (`User` for `app::model::User`).
    pub fn name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordType({})", self.name)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn short_type_name(full: &str) -> &str {
    // Generic arguments may contain paths themselves; only trim the outer path.
    let outer = full.split('<').next().unwrap_or(full);
    match outer.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
