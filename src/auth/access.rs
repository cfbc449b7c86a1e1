use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::db::predicate::{Expr, Operand};
use crate::db::SqlValue;

/// Flag set describing which task endpoints a user may reach.
///
/// Stored as its integer bits, both in tokens and in the `access` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointAccess(u32);

impl EndpointAccess {
    pub const NONE: EndpointAccess = EndpointAccess(0);
    /// Read and write the caller's own tasks.
    pub const TASKS_OWNED: EndpointAccess = EndpointAccess(1 << 0);
    /// List every user's tasks.
    pub const TASKS_ALL: EndpointAccess = EndpointAccess(1 << 1);

    const NAMED: [(EndpointAccess, &'static str); 2] = [
        (Self::TASKS_OWNED, "TasksOwned"),
        (Self::TASKS_ALL, "TasksAll"),
    ];

    /// Every defined flag; the access level of the administrator account.
    pub const fn all() -> Self {
        EndpointAccess(Self::TASKS_OWNED.0 | Self::TASKS_ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Keeps only the defined flags of `bits`.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        EndpointAccess(bits & Self::all().0)
    }

    /// Whether every flag of `required` is set. Always true for `NONE`.
    pub const fn contains(self, required: EndpointAccess) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for EndpointAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        EndpointAccess(self.0 | rhs.0)
    }
}

impl BitOrAssign for EndpointAccess {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EndpointAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join(", "))
        }
    }
}

impl From<EndpointAccess> for SqlValue {
    fn from(access: EndpointAccess) -> Self {
        SqlValue::Int(access.0 as i64)
    }
}

impl Operand for EndpointAccess {
    fn into_expr(self) -> Expr {
        Expr::Constant(self.into())
    }
}
