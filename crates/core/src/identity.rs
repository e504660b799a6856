use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("caller presented no roles")]
    NoRoles,
}

/// The authenticated caller's role set, derived from the inbound credential.
/// Invariant: non-empty — unauthenticated or role-less requests are rejected
/// before any other processing.
///
/// Today the role source is the `x-user-roles` header set by the upstream
/// auth middleware. Deriving roles from verified token claims instead only
/// requires replacing the call site that builds this value; nothing downstream
/// of the gate sees the raw header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub roles: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn new(roles: BTreeSet<String>) -> Result<Self, IdentityError> {
        if roles.is_empty() {
            return Err(IdentityError::NoRoles);
        }
        Ok(Self { roles })
    }

    /// Parse a comma-separated role list (`"admin, staff"`). Blank segments
    /// are dropped; an all-blank value is an error.
    pub fn from_header_value(value: &str) -> Result<Self, IdentityError> {
        let roles: BTreeSet<String> = value
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(roles)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Stable display form for audit metadata.
    pub fn roles_label(&self) -> String {
        self.roles.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::{CallerIdentity, IdentityError};

    #[test]
    fn header_value_is_split_and_trimmed() {
        let identity = CallerIdentity::from_header_value(" admin , staff ").expect("parses");
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("staff"));
        assert_eq!(identity.roles.len(), 2);
    }

    #[test]
    fn duplicate_roles_collapse() {
        let identity = CallerIdentity::from_header_value("staff,staff").expect("parses");
        assert_eq!(identity.roles.len(), 1);
        assert_eq!(identity.roles_label(), "staff");
    }

    #[test]
    fn blank_header_is_rejected() {
        assert_eq!(CallerIdentity::from_header_value("  , ,").unwrap_err(), IdentityError::NoRoles);
        assert_eq!(CallerIdentity::from_header_value("").unwrap_err(), IdentityError::NoRoles);
    }
}
