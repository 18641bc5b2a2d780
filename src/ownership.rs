//! Ownership configuration and file-to-owner resolution.
//!
//! The ownership file is a YAML document mapping component names (path
//! prefixes) to reviewer and approver lists:
//!
//! ```yaml
//! components:
//!   docs:
//!     reviewers: [alice]
//!     approvers: [bob]
//!   server/api:
//!     reviewers: [carol, dave]
//! ignored-authors: [renovate-bot]
//! ```
//!
//! The schema is closed: unrecognized keys anywhere in the document are
//! rejected, so typos fail loudly instead of silently dropping owners.
//! Component order is the document order; the resolver iterates components
//! in that order and accumulates owners with first-seen-wins deduplication.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The payload is not well-formed YAML matching the ownership schema.
    #[error("invalid ownership config: {0}")]
    Invalid(String),
}

/// Reviewer and approver lists for one component.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Owners {
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub approvers: Vec<String>,
}

/// The parsed ownership configuration for one repository.
///
/// Constructed once per triggering event from the file at the pull request's
/// base SHA, and discarded when the event has been handled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnershipConfig {
    #[serde(default)]
    components: ComponentMap,
    /// Parsed for schema completeness but not consulted by any transition;
    /// see DESIGN.md.
    #[serde(rename = "ignored-authors", default)]
    ignored_authors: BTreeSet<String>,
}

impl OwnershipConfig {
    /// Parse the raw bytes of an ownership file.
    pub fn parse(raw: &[u8]) -> Result<Self, ConfigError> {
        serde_yaml::from_slice(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Serialize back to YAML, preserving component order.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Components in document order.
    pub fn components(&self) -> impl Iterator<Item = (&str, &Owners)> {
        self.components
            .0
            .iter()
            .map(|(name, owners)| (name.as_str(), owners))
    }

    pub fn ignored_authors(&self) -> &BTreeSet<String> {
        &self.ignored_authors
    }
}

/// Ordered component-name-to-owners mapping.
///
/// A `Vec` rather than a hash map because the resolver's output order is
/// defined by the document order of the components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ComponentMap(Vec<(String, Owners)>);

impl Serialize for ComponentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, owners) in &self.0 {
            map.serialize_entry(name, owners)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ComponentMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ComponentMapVisitor;

        impl<'de> Visitor<'de> for ComponentMapVisitor {
            type Value = ComponentMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of component name to owners")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut entries: Vec<(String, Owners)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, owners)) = access.next_entry::<String, Owners>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate component {name:?}"
                        )));
                    }
                    entries.push((name, owners));
                }
                Ok(ComponentMap(entries))
            }
        }

        deserializer.deserialize_map(ComponentMapVisitor)
    }
}

/// The resolved responsible parties for a set of changed files.
///
/// Both sequences preserve first-seen order and contain no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerSets {
    pub reviewers: Vec<String>,
    pub approvers: Vec<String>,
}

/// Compute the reviewers and approvers responsible for a change.
///
/// A component matches when any changed file path equals the component name
/// or is nested under it as a path prefix. Matching components contribute
/// their owners in document order; duplicates are dropped on append. An
/// empty file set, or one touching no component, yields two empty sequences
/// and is not an error.
pub fn resolve_owners(config: &OwnershipConfig, changed_files: &[String]) -> OwnerSets {
    let mut owners = OwnerSets::default();
    for (component, component_owners) in config.components() {
        if !changed_files
            .iter()
            .any(|path| component_matches(component, path))
        {
            continue;
        }
        for reviewer in &component_owners.reviewers {
            push_unique(&mut owners.reviewers, reviewer);
        }
        for approver in &component_owners.approvers {
            push_unique(&mut owners.approvers, approver);
        }
    }
    owners
}

/// Prefix match on path segment boundaries: `foo/bar` matches `foo/bar`
/// itself and `foo/bar/baz.ts`, but not `foo/barbaz`. A trailing slash on
/// the component name is tolerated.
fn component_matches(component: &str, path: &str) -> bool {
    let prefix = component.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

fn push_unique(seen: &mut Vec<String>, name: &str) {
    if !seen.iter().any(|existing| existing == name) {
        seen.push(name.to_string());
    }
}
