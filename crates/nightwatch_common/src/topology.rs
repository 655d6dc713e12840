//! Container topology - the set of identifiers the validator trusts.
//!
//! Read from a compose-style YAML file with a `services` mapping. For each
//! service the container identifier is `container_name` when present,
//! otherwise the service key itself.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ComposeFile {
    services: BTreeMap<String, ServiceEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    container_name: Option<String>,
}

/// The containers Nightwatch observes and is allowed to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    containers: Vec<String>,
}

impl Topology {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let compose: ComposeFile =
            serde_yaml::from_str(contents).context("topology is not a compose-style file")?;

        let mut containers: Vec<String> = compose
            .services
            .into_iter()
            .map(|(service, entry)| entry.container_name.unwrap_or(service))
            .collect();
        containers.sort();
        containers.dedup();

        tracing::debug!("topology defines {} container(s)", containers.len());
        Ok(Self { containers })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse topology {}", path.display()))
    }

    /// Known container identifiers, sorted and deduplicated.
    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.containers.iter().any(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = r#"
services:
  cache:
    image: redis:7
  api:
    image: acme/api:latest
    container_name: acme-api
    depends_on:
      - cache
  frontend:
    image: acme/frontend:latest
"#;

    #[test]
    fn test_service_keys_become_identifiers() {
        let topo = Topology::from_yaml(COMPOSE).unwrap();
        assert!(topo.is_known("cache"));
        assert!(topo.is_known("frontend"));
    }

    #[test]
    fn test_container_name_overrides_service_key() {
        let topo = Topology::from_yaml(COMPOSE).unwrap();
        assert!(topo.is_known("acme-api"));
        assert!(!topo.is_known("api"));
    }

    #[test]
    fn test_containers_sorted() {
        let topo = Topology::from_yaml(COMPOSE).unwrap();
        assert_eq!(topo.containers(), &["acme-api", "cache", "frontend"]);
    }

    #[test]
    fn test_missing_services_rejected() {
        assert!(Topology::from_yaml("version: '3'\n").is_err());
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(Topology::from_yaml("services: [not, a, mapping").is_err());
    }
}
