//! Process-wide registry of entity specs
//!
//! Built once at startup and shared read-only behind an `Arc`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use super::{builtin_specs, EntitySpec};
use crate::{Error, Result};

/// Layout of an `entity_spec_file`
#[derive(Debug, Deserialize)]
struct SpecFile {
    #[serde(default, rename = "entity")]
    entities: Vec<EntitySpec>,
}

/// Immutable lookup of entity specs by name
#[derive(Debug, Clone)]
pub struct SpecRegistry {
    specs: BTreeMap<String, EntitySpec>,
}

impl SpecRegistry {
    /// Build a registry from explicit specs
    ///
    /// Fails on invalid identifiers or duplicate entity names.
    pub fn from_specs(specs: Vec<EntitySpec>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for spec in specs {
            spec.check_identifiers()?;
            if map.contains_key(&spec.name) {
                return Err(Error::Config(format!("Duplicate entity spec: {}", spec.name)));
            }
            map.insert(spec.name.clone(), spec);
        }
        Ok(Self { specs: map })
    }

    /// Registry of the built-in entities
    pub fn builtin() -> Result<Self> {
        Self::from_specs(builtin_specs())
    }

    /// Built-in entities, with any spec in `override_file` replacing the
    /// built-in of the same name (or adding a new entity)
    pub fn load(override_file: Option<&Path>) -> Result<Self> {
        let mut specs: BTreeMap<String, EntitySpec> = builtin_specs()
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        if let Some(path) = override_file {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let file: SpecFile = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("Invalid entity spec file {}: {}", path.display(), e))
                })?;
                for spec in file.entities {
                    info!("Entity spec '{}' loaded from {}", spec.name, path.display());
                    specs.insert(spec.name.clone(), spec);
                }
            } else {
                warn!(
                    "Entity spec file {} not found, using built-in specs",
                    path.display()
                );
            }
        }

        Self::from_specs(specs.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Option<&EntitySpec> {
        self.specs.get(name)
    }

    /// Specs in name order
    pub fn iter(&self) -> impl Iterator<Item = &EntitySpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
