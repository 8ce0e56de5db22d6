use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{ProvisionError, ProvisionResult};

/// A sibling build unit whose output is staged and put on the classpath.
///
/// This is the whole contract the pipeline needs from a build system: a
/// stable identifier and the path of the artifact it produced.
pub trait BuildUnit {
    fn identifier(&self) -> &str;

    /// Resolved output file. Fails if the unit has not produced it.
    fn output_path(&self) -> ProvisionResult<PathBuf>;
}

/// Project entry from `spigot-runner.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRef {
    pub name: String,
    pub jar: PathBuf,
}

impl ProjectRef {
    pub fn new(name: impl Into<String>, jar: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            jar: jar.into(),
        }
    }

    /// Anchor a relative jar path at `root`.
    pub fn resolved_against(mut self, root: &Path) -> Self {
        if self.jar.is_relative() {
            self.jar = root.join(&self.jar);
        }
        self
    }
}

impl BuildUnit for ProjectRef {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn output_path(&self) -> ProvisionResult<PathBuf> {
        let metadata = std::fs::metadata(&self.jar).map_err(|e| ProvisionError::io(&self.jar, e))?;
        if !metadata.is_file() {
            return Err(ProvisionError::Config(format!(
                "Output of project '{}' is not a file: {}",
                self.name,
                self.jar.display()
            )));
        }
        Ok(self.jar.clone())
    }
}
