// SPDX-License-Identifier: MIT
//! Repository identifiers and the canonical on-disk directory naming scheme.

use std::fmt;
use std::str::FromStr;

/// What a repository holds: a model or a dataset. Spelled out on disk as
/// the plural prefix of the repository's canonical directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    Model,
    Dataset,
}

impl RepoKind {
    /// All kinds, used when a repo id is ambiguous and both are plausible.
    pub const ALL: [RepoKind; 2] = [RepoKind::Model, RepoKind::Dataset];
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoKind::Model => write!(f, "model"),
            RepoKind::Dataset => write!(f, "dataset"),
        }
    }
}

/// A `{owner, name}` repository identifier, as it appears in a hub URL
/// (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepoIdError {
    #[error("repository id {0:?} must be of the form owner/name")]
    NotTwoParts(String),
    #[error("repository id component {0:?} is empty")]
    Empty(String),
    #[error("repository id component {0:?} contains characters outside [A-Za-z0-9_.-]")]
    InvalidChars(String),
    #[error("repository id component {0:?} must not be '.' or '..'")]
    DotComponent(String),
}

fn validate_component(component: &str) -> Result<(), RepoIdError> {
    if component.is_empty() {
        return Err(RepoIdError::Empty(component.to_string()));
    }
    if component == "." || component == ".." {
        return Err(RepoIdError::DotComponent(component.to_string()));
    }
    if !component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(RepoIdError::InvalidChars(component.to_string()));
    }
    Ok(())
}

impl FromStr for RepoId {
    type Err = RepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '/');
        let (owner, name) = match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) if !name.contains('/') => (owner, name),
            _ => return Err(RepoIdError::NotTwoParts(s.to_string())),
        };
        validate_component(owner)?;
        validate_component(name)?;
        Ok(RepoId {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl RepoId {
    /// The canonical directory name under `hub/`, e.g. `models--owner--name`.
    pub fn canonical_dir_name(&self, kind: RepoKind) -> String {
        format!("{kind}s--{}--{}", self.owner, self.name)
    }

    /// The friendly-view path segment, e.g. `owner/name` under `models/`.
    pub fn friendly_path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_id() {
        let id: RepoId = "bert-base-uncased-org/bert-base-uncased".parse().unwrap();
        assert_eq!(id.owner, "bert-base-uncased-org");
        assert_eq!(id.name, "bert-base-uncased");
    }

    #[test]
    fn rejects_missing_slash() {
        assert!("just-a-name".parse::<RepoId>().is_err());
    }

    #[test]
    fn rejects_dot_component() {
        assert!("owner/..".parse::<RepoId>().is_err());
        assert!("./name".parse::<RepoId>().is_err());
    }

    #[test]
    fn rejects_invalid_chars() {
        assert!("owner/name with spaces".parse::<RepoId>().is_err());
        assert!("ow ner/name".parse::<RepoId>().is_err());
    }

    #[test]
    fn canonical_dir_name_uses_double_dash() {
        let id: RepoId = "owner/name".parse().unwrap();
        assert_eq!(id.canonical_dir_name(RepoKind::Model), "models--owner--name");
        assert_eq!(
            id.canonical_dir_name(RepoKind::Dataset),
            "datasets--owner--name"
        );
    }
}
