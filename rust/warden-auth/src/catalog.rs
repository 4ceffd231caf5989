use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::IssueError;

/// A named tool a session may be authorized to invoke.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    /// Stable identifier, committed to on the ledger.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

impl Capability {
    /// Create a capability.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A catalog could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Two entries share a name.
    #[error("capability {0:?} is defined more than once")]
    Duplicate(String),

    /// A name is empty, or contains `:` or whitespace.
    #[error("capability name {0:?} is not a valid identifier")]
    InvalidName(String),
}

/// The fixed set of capabilities this process can authorize.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<Capability>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, preserving definition order.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::default();
        for capability in capabilities {
            let valid = !capability.name.is_empty()
                && !capability
                    .name
                    .chars()
                    .any(|c| c == ':' || c.is_whitespace());
            if !valid {
                return Err(CatalogError::InvalidName(capability.name));
            }
            if catalog.index.contains_key(&capability.name) {
                return Err(CatalogError::Duplicate(capability.name));
            }
            catalog
                .index
                .insert(capability.name.clone(), catalog.entries.len());
            catalog.entries.push(capability);
        }
        Ok(catalog)
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|i| &self.entries[*i])
    }

    /// Returns `true` if `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Every capability in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a declared list of names to catalog entries.
    ///
    /// The result keeps the declared order. The whole declaration is
    /// rejected if it is empty, repeats a name, or names anything the catalog
    /// lacks; in the last case every unknown name is reported.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Capability>, IssueError> {
        if names.is_empty() {
            return Err(IssueError::NoCapabilities);
        }

        let mut seen = HashSet::new();
        let mut unknown = Vec::new();
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(IssueError::DuplicateCapability(name.to_string()));
            }
            match self.get(name) {
                Some(capability) => resolved.push(capability.clone()),
                None => unknown.push(name.to_string()),
            }
        }

        if unknown.is_empty() {
            Ok(resolved)
        } else {
            Err(IssueError::UnknownCapability { names: unknown })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn catalog() -> Catalog {
        Catalog::new([
            Capability::new("search", "Search the web"),
            Capability::new("query", "Query the graph"),
            Capability::new("summarize", "Summarize a document"),
        ])
        .unwrap()
    }

    #[test]
    fn it_resolves_in_declared_order() -> TestResult {
        let resolved = catalog().resolve(&["summarize", "search"])?;
        let names: Vec<_> = resolved.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["summarize", "search"]);
        assert_eq!(resolved[1].description, "Search the web");
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_names_all_at_once() {
        match catalog().resolve(&["search", "delete", "drop"]) {
            Err(IssueError::UnknownCapability { names }) => {
                assert_eq!(names, vec!["delete".to_string(), "drop".to_string()]);
            }
            other => panic!("expected UnknownCapability, got {other:?}"),
        }
    }

    #[test]
    fn it_rejects_duplicates_and_empty_declarations() {
        assert!(matches!(
            catalog().resolve(&["search", "search"]),
            Err(IssueError::DuplicateCapability(name)) if name == "search"
        ));
        assert!(matches!(
            catalog().resolve::<&str>(&[]),
            Err(IssueError::NoCapabilities)
        ));
    }

    #[test]
    fn it_refuses_ambiguous_definitions() {
        assert_eq!(
            Catalog::new([Capability::new("a", "x"), Capability::new("a", "y")]).unwrap_err(),
            CatalogError::Duplicate("a".into())
        );
        assert_eq!(
            Catalog::new([Capability::new("urn:tool", "x")]).unwrap_err(),
            CatalogError::InvalidName("urn:tool".into())
        );
    }
}
