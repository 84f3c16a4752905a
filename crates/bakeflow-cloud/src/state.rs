//! Per-instance state store
//!
//! Four deterministic paths per instance key under the working directory:
//! the persisted state record, the private key, the generated inventory and
//! the generated playbook. The state record is the only durable bridge
//! between process invocations and is deliberately a small, hand-editable
//! YAML document.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const WORK_DIR: &str = ".bakeflow";

/// The four files owned by one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFiles {
    pub state: PathBuf,
    pub keyfile: PathBuf,
    pub inventory: PathBuf,
    pub playbook: PathBuf,
}

impl InstanceFiles {
    /// Pure path derivation, no I/O
    pub fn new(workdir: impl AsRef<Path>, instance_key: &str) -> Self {
        let workdir = workdir.as_ref();
        Self {
            state: workdir.join(format!("{instance_key}-state.yml")),
            keyfile: workdir.join(format!("{instance_key}.pem")),
            inventory: workdir.join(format!("{instance_key}.inventory")),
            playbook: workdir.join(format!("{instance_key}-playbook.yml")),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.state, &self.keyfile, &self.inventory, &self.playbook]
    }
}

/// Live cloud resource identifiers for one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResources {
    pub id: String,
    pub ip: String,
}

/// The durable record bridging process invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub keyname: String,
    pub build: BuildResources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami_id: Option<String>,
}

impl PersistedState {
    pub fn exists(files: &InstanceFiles) -> bool {
        files.state.exists()
    }

    pub fn load(files: &InstanceFiles) -> Result<Self> {
        if !files.state.exists() {
            return Err(CloudError::StateNotFound {
                path: files.state.clone(),
            });
        }
        let content = std::fs::read_to_string(&files.state)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the record, creating the working directory lazily
    pub fn save(&self, files: &InstanceFiles) -> Result<()> {
        if let Some(parent) = files.state.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&files.state, content)?;
        tracing::debug!("Saved state to {}", files.state.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> PersistedState {
        PersistedState {
            keyname: "bakeflow-a1b2c3d4e5".to_string(),
            build: BuildResources {
                id: "i-00000001".to_string(),
                ip: "20.30.40.50".to_string(),
            },
            ami_id: None,
        }
    }

    #[test]
    fn paths_derive_from_the_instance_key_alone() {
        let files = InstanceFiles::new(".bakeflow", "centos-default");
        assert_eq!(files.state, PathBuf::from(".bakeflow/centos-default-state.yml"));
        assert_eq!(files.keyfile, PathBuf::from(".bakeflow/centos-default.pem"));
        assert_eq!(
            files.inventory,
            PathBuf::from(".bakeflow/centos-default.inventory")
        );
        assert_eq!(
            files.playbook,
            PathBuf::from(".bakeflow/centos-default-playbook.yml")
        );
    }

    #[test]
    fn save_creates_the_working_directory_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join(WORK_DIR);
        let files = InstanceFiles::new(&workdir, "centos-default");

        assert!(!workdir.exists());
        sample().save(&files).unwrap();
        assert!(workdir.exists());
    }

    #[test]
    fn round_trips_including_ami_id_add_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let files = InstanceFiles::new(dir.path(), "centos-default");

        let mut state = sample();
        state.save(&files).unwrap();
        assert_eq!(PersistedState::load(&files).unwrap(), state);

        state.ami_id = Some("ami-00000001".to_string());
        state.save(&files).unwrap();
        assert_eq!(PersistedState::load(&files).unwrap(), state);

        state.ami_id = None;
        state.save(&files).unwrap();
        let reloaded = PersistedState::load(&files).unwrap();
        assert_eq!(reloaded, state);
        // the cleared field is dropped from the document, not nulled
        let text = std::fs::read_to_string(&files.state).unwrap();
        assert!(!text.contains("ami_id"));
    }

    #[test]
    fn load_without_state_is_state_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let files = InstanceFiles::new(dir.path(), "centos-default");
        let err = PersistedState::load(&files).unwrap_err();
        assert!(matches!(err, CloudError::StateNotFound { .. }));
    }
}
