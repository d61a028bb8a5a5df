//! Shared identifier and authorization types.

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;

/// Abbreviate a UUID for log output (first 8 chars).
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Operations that can be performed on resources.
// *-All means unrestricted access, *-Own means restricted to own resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    ReadAll,
    ReadOwn,
    UpdateOwn,
    DeleteOwn,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll => write!(f, "create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "read"),
            Operation::UpdateOwn => write!(f, "update"),
            Operation::DeleteOwn => write!(f, "delete"),
        }
    }
}
