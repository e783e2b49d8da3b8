//! Report authorisation policy.
//!
//! Identity comes from the caller; this module only decides whether a role
//! may sign off a report. Admins and super-admins may, users may not.
//! Default-deny: any role not listed as elevated is refused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::Role;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Why a decision came out the way it did, for the log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    ElevatedRole,
    Denied,
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self { allowed: true, reason }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════

pub fn is_elevated(role: Role) -> bool {
    matches!(role, Role::Admin | Role::SuperAdmin)
}

/// May `actor` authorise reports?
pub fn can_authorise_reports(actor: &Actor) -> AccessDecision {
    let decision = if is_elevated(actor.role) {
        AccessDecision::allow(AccessReason::ElevatedRole)
    } else {
        AccessDecision::deny()
    };
    tracing::debug!(
        actor = %actor.id,
        role = %actor.role,
        allowed = decision.allowed,
        "Report authorisation check"
    );
    decision
}
