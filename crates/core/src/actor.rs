//! The authenticated caller of an engine operation.
//!
//! Authentication and role gating happen in the transport layer; the engine only
//! records who acted and enforces ownership rules.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Organizational roles known to the workflow.
///
/// Roles double as notification audiences (`NotificationIntent::role`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Requester,
    Approver,
    Npd,
    Maintenance,
    Spares,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Requester => "Requester",
            Role::Approver => "Approver",
            Role::Npd => "NPD",
            Role::Maintenance => "Maintenance",
            Role::Spares => "Spares",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this actor may act on a record owned by `owner`.
    ///
    /// Requesters are limited to their own records; every other role is not.
    pub fn may_access_owned_by(&self, owner: UserId) -> bool {
        self.role != Role::Requester || self.user_id == owner
    }
}
