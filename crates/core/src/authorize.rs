use thiserror::Error;

use crate::action::ActionRequest;
use crate::catalog::CommandCatalog;
use crate::identity::CallerIdentity;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthzRejection {
    #[error("unknown action: {action}")]
    UnknownAction { action: String },
    #[error("forbidden: role(s) [{roles}] cannot execute {action}")]
    Forbidden { action: String, roles: String },
}

impl AuthzRejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownAction { .. } => "unknown_action",
            Self::Forbidden { .. } => "forbidden",
        }
    }
}

/// Accept or reject an interpreted action against the command catalog.
/// Pure function, no I/O: unknown actions are rejected before any role check
/// so the boundary can map them to 400 rather than 403.
pub fn authorize(
    catalog: &CommandCatalog,
    request: &ActionRequest,
    caller: &CallerIdentity,
) -> Result<(), AuthzRejection> {
    if !catalog.contains(&request.action) {
        return Err(AuthzRejection::UnknownAction { action: request.action.clone() });
    }
    if !catalog.is_allowed(&request.action, &caller.roles) {
        return Err(AuthzRejection::Forbidden {
            action: request.action.clone(),
            roles: caller.roles_label(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::action::ActionRequest;
    use crate::catalog::default_catalog;
    use crate::identity::CallerIdentity;

    use super::{authorize, AuthzRejection};

    fn caller(roles: &[&str]) -> CallerIdentity {
        CallerIdentity::from_header_value(&roles.join(",")).expect("non-empty roles")
    }

    #[test]
    fn allowed_role_subset_is_ok() {
        let catalog = default_catalog();
        let request = ActionRequest::new("createProgram", json!({}));
        assert_eq!(authorize(&catalog, &request, &caller(&["staff"])), Ok(()));
    }

    #[test]
    fn disjoint_roles_are_forbidden() {
        let catalog = default_catalog();
        let request = ActionRequest::new("createProgram", json!({}));
        let rejection = authorize(&catalog, &request, &caller(&["affiliate"])).unwrap_err();
        assert_eq!(rejection.reason_code(), "forbidden");
        assert!(matches!(rejection, AuthzRejection::Forbidden { ref action, .. } if action == "createProgram"));
    }

    #[test]
    fn unknown_action_is_rejected_before_roles_matter() {
        let catalog = default_catalog();
        let request = ActionRequest::new("doesNotExist", json!({}));
        let rejection = authorize(&catalog, &request, &caller(&["admin"])).unwrap_err();
        assert_eq!(rejection.reason_code(), "unknown_action");
    }

    #[test]
    fn forbidden_message_names_roles_and_action() {
        let catalog = default_catalog();
        let request = ActionRequest::new("runPayoutBatch", json!({}));
        let rejection = authorize(&catalog, &request, &caller(&["staff", "affiliate"])).unwrap_err();
        let message = rejection.to_string();
        assert!(message.contains("runPayoutBatch"));
        assert!(message.contains("affiliate,staff"));
    }
}
