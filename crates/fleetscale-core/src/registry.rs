//! Static cluster registry, loaded once at startup.
//!
//! TOML form:
//!
//! ```toml
//! [[cluster]]
//! id = "j-2AXXXXXXGAPLF"
//! ip = "10.0.1.20"
//! type = "Presto"
//! metadata = { region = "us-east-1" }
//! ```
//!
//! A `.json` file holding an array of the same objects is accepted too.

use std::collections::HashSet;
use std::path::Path;

use fleetscale_state::ClusterDescriptor;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "cluster")]
    clusters: Vec<ClusterDescriptor>,
}

/// Immutable, ordered set of clusters known to the daemon.
#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    clusters: Vec<ClusterDescriptor>,
}

impl ClusterRegistry {
    /// Build a registry, rejecting duplicate ids. Order is preserved.
    pub fn new(clusters: Vec<ClusterDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for cluster in &clusters {
            if !seen.insert(cluster.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate cluster id '{}' in registry",
                    cluster.id
                )));
            }
        }
        Ok(Self { clusters })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let clusters = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<Vec<ClusterDescriptor>>(&content).map_err(|source| {
                ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        } else {
            toml::from_str::<RegistryFile>(&content)
                .map_err(|source| ConfigError::Toml {
                    path: path.to_path_buf(),
                    source,
                })?
                .clusters
        };
        Self::new(clusters)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterDescriptor> {
        self.clusters.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ClusterDescriptor> {
        self.clusters.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
