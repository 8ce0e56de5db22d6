use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::project::ProjectRef;
use crate::core::error::{ProvisionError, ProvisionResult};

pub const CONFIG_FILE_NAME: &str = "spigot-runner.json";

/// System property through which the launched server finds the code under test.
pub const DEFAULT_CLASSPATH_PROPERTY: &str = "io.fairyproject.devtools.classpath";

/// Run configuration, persisted as `spigot-runner.json` at the project root.
///
/// A config without `version` is valid and means "disabled": the pipeline
/// does nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningConfig {
    pub version: Option<String>,
    /// Java major used for BuildTools and the server; derived from `version` if unset.
    pub java_version: Option<u32>,
    pub java_home: Option<PathBuf>,
    /// Server arguments, passed after `-jar`.
    pub args: Vec<String>,
    /// JVM options, passed before `-jar`.
    pub jvm_args: Vec<String>,
    pub projects: Vec<ProjectRef>,
    pub cleanup: bool,
    pub persist_snapshot: bool,
    pub classpath_property: String,
    pub build_tools_url: Option<String>,
    pub build_tools_sha1: Option<String>,

    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            version: None,
            java_version: None,
            java_home: None,
            args: Vec::new(),
            jvm_args: Vec::new(),
            projects: Vec::new(),
            cleanup: false,
            persist_snapshot: false,
            classpath_property: DEFAULT_CLASSPATH_PROPERTY.to_string(),
            build_tools_url: None,
            build_tools_sha1: None,
            project_root: PathBuf::new(),
        }
    }
}

impl ProvisioningConfig {
    /// Load the config for `project_root`.
    ///
    /// `config_path` defaults to `<root>/spigot-runner.json`. A missing
    /// default file yields the disabled default; a missing explicit file is
    /// an error.
    pub async fn load(project_root: &Path, config_path: Option<&Path>) -> ProvisionResult<Self> {
        let (path, explicit) = match config_path {
            Some(path) => (path.to_path_buf(), true),
            None => (project_root.join(CONFIG_FILE_NAME), false),
        };

        let mut config = match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                debug!("Loaded run configuration from {:?}", path);
                serde_json::from_str::<ProvisioningConfig>(&json)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                info!("No {} found, using defaults", CONFIG_FILE_NAME);
                ProvisioningConfig::default()
            }
            Err(e) => return Err(ProvisionError::io(path, e)),
        };

        config.project_root = project_root.to_path_buf();
        config.resolve_project_paths();
        Ok(config)
    }

    /// Anchor relative project jars at the project root.
    pub fn resolve_project_paths(&mut self) {
        let root = self.project_root.clone();
        self.projects = std::mem::take(&mut self.projects)
            .into_iter()
            .map(|p| p.resolved_against(&root))
            .collect();
    }

    pub fn is_enabled(&self) -> bool {
        self.version
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }
}
