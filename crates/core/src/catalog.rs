use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One allowed action and the caller roles permitted to invoke it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub allowed_roles: BTreeSet<String>,
}

impl CommandSpec {
    pub fn new<I, S>(name: impl Into<String>, allowed_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            allowed_roles: allowed_roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate command name `{0}` in catalog")]
    DuplicateName(String),
    #[error("command `{0}` has an empty role set")]
    EmptyRoles(String),
    #[error("command with empty name in catalog")]
    EmptyName,
    #[error("could not parse catalog document: {0}")]
    Parse(String),
}

/// Immutable table of allowed actions, constructed once at startup and passed
/// by reference into the authorization gate. Lookups are case-sensitive exact
/// matches; unknown names are never allowed.
#[derive(Clone, Debug, Default)]
pub struct CommandCatalog {
    by_name: HashMap<String, CommandSpec>,
}

impl CommandCatalog {
    pub fn from_specs(specs: Vec<CommandSpec>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(specs.len());
        for spec in specs {
            if spec.name.is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if spec.allowed_roles.is_empty() {
                return Err(CatalogError::EmptyRoles(spec.name));
            }
            if by_name.insert(spec.name.clone(), spec.clone()).is_some() {
                return Err(CatalogError::DuplicateName(spec.name));
            }
        }
        Ok(Self { by_name })
    }

    /// Parse a catalog from a TOML document of the form:
    ///
    /// ```toml
    /// [[commands]]
    /// name = "createProgram"
    /// allowed_roles = ["admin", "staff"]
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, CatalogError> {
        let parsed: CatalogDocument =
            toml::from_str(document).map_err(|error| CatalogError::Parse(error.to_string()))?;
        Self::from_specs(parsed.commands)
    }

    pub fn contains(&self, action_name: &str) -> bool {
        self.by_name.contains_key(action_name)
    }

    pub fn get(&self, action_name: &str) -> Option<&CommandSpec> {
        self.by_name.get(action_name)
    }

    /// True iff the action exists and the caller holds at least one of its
    /// allowed roles. Absence and role mismatch are both `false`; the
    /// authorization gate distinguishes them via [`CommandCatalog::contains`].
    pub fn is_allowed(&self, action_name: &str, caller_roles: &BTreeSet<String>) -> bool {
        match self.by_name.get(action_name) {
            Some(spec) => spec.allowed_roles.intersection(caller_roles).next().is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    commands: Vec<CommandSpec>,
}

/// The built-in command table for the training-platform backend.
pub fn default_catalog() -> CommandCatalog {
    let specs = vec![
        CommandSpec::new("createProgram", ["admin", "staff"]),
        CommandSpec::new("updateTuition", ["admin", "staff"]),
        CommandSpec::new("createAffiliate", ["admin"]),
        CommandSpec::new("createReferral", ["admin", "staff", "affiliate"]),
        CommandSpec::new("calculateCommission", ["admin", "staff"]),
        CommandSpec::new("runPayoutBatch", ["admin"]),
        CommandSpec::new("getETPLReport", ["admin", "staff"]),
        CommandSpec::new("addStudent", ["admin", "staff"]),
        CommandSpec::new("updateEnrollment", ["admin", "staff"]),
        CommandSpec::new("getStats", ["admin", "staff"]),
    ];
    CommandCatalog::from_specs(specs).expect("built-in catalog is valid")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{default_catalog, CatalogError, CommandCatalog, CommandSpec};

    fn roles(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unknown_action_is_never_allowed() {
        let catalog = default_catalog();
        assert!(!catalog.contains("doesNotExist"));
        assert!(!catalog.is_allowed("doesNotExist", &roles(&["admin"])));
    }

    #[test]
    fn role_intersection_grants_access() {
        let catalog = default_catalog();
        assert!(catalog.is_allowed("createProgram", &roles(&["staff", "viewer"])));
        assert!(!catalog.is_allowed("createProgram", &roles(&["affiliate"])));
    }

    #[test]
    fn action_names_are_case_sensitive() {
        let catalog = default_catalog();
        assert!(catalog.contains("createProgram"));
        assert!(!catalog.contains("createprogram"));
        assert!(!catalog.is_allowed("CREATEPROGRAM", &roles(&["admin"])));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = CommandCatalog::from_specs(vec![
            CommandSpec::new("getStats", ["admin"]),
            CommandSpec::new("getStats", ["staff"]),
        ]);
        assert_eq!(result.unwrap_err(), CatalogError::DuplicateName("getStats".to_string()));
    }

    #[test]
    fn empty_role_set_is_rejected() {
        let result = CommandCatalog::from_specs(vec![CommandSpec::new(
            "createProgram",
            Vec::<String>::new(),
        )]);
        assert_eq!(result.unwrap_err(), CatalogError::EmptyRoles("createProgram".to_string()));
    }

    #[test]
    fn catalog_loads_from_toml() {
        let catalog = CommandCatalog::from_toml_str(
            r#"
            [[commands]]
            name = "createProgram"
            allowed_roles = ["admin", "staff"]

            [[commands]]
            name = "runPayoutBatch"
            allowed_roles = ["admin"]
            "#,
        )
        .expect("document parses");

        assert_eq!(catalog.len(), 2);
        assert!(catalog.is_allowed("runPayoutBatch", &roles(&["admin"])));
        assert!(!catalog.is_allowed("runPayoutBatch", &roles(&["staff"])));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = CommandCatalog::from_toml_str("commands = 3");
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }

    #[test]
    fn builtin_catalog_has_every_worker_command() {
        let catalog = default_catalog();
        for name in [
            "createProgram",
            "updateTuition",
            "createAffiliate",
            "createReferral",
            "calculateCommission",
            "runPayoutBatch",
            "getETPLReport",
            "addStudent",
            "updateEnrollment",
            "getStats",
        ] {
            assert!(catalog.contains(name), "missing {name}");
        }
        assert_eq!(catalog.len(), 10);
    }
}
