// SPDX-License-Identifier: MIT
//! Named mirror destinations, persisted as a process-user YAML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A named mirror destination: somewhere another cache root lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
}

/// The `targets.yaml` file mapping a target name to its record.
///
/// This is pure data plus (de)serialization; deciding *where* the file
/// lives and invoking load/save is left to the outer layer, which is why
/// `config_path` takes an explicit directory rather than discovering one
/// itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStore {
    #[serde(flatten)]
    targets: BTreeMap<String, Target>,
}

impl TargetStore {
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, target: Target) {
        self.targets.insert(name.into(), target);
    }

    pub fn remove(&mut self, name: &str) -> Option<Target> {
        self.targets.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Target)> {
        self.targets.iter()
    }

    /// Conventional path for the target configuration file under a
    /// user-configuration directory: `<config_dir>/hfd/targets.yaml`.
    pub fn config_path(config_dir: &Path) -> PathBuf {
        config_dir.join("hfd").join("targets.yaml")
    }

    pub fn load(path: &Path) -> Result<Self, TargetStoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_yaml::from_str(&content).map_err(|source| TargetStoreError::Parse {
                    path: path.display().to_string(),
                    source,
                })
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(TargetStoreError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TargetStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TargetStoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|source| TargetStoreError::Serialize {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, yaml).map_err(|source| TargetStoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetStoreError {
    #[error("reading target store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing target store {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("serializing target store {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
