// ─── Classpath Registry ───
// Collects the build outputs exposed to the launched server through a system property.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::config::BuildUnit;
use crate::core::error::{ProvisionError, ProvisionResult};

/// Identifier → resolved output path. Entries are only ever added, and the
/// serialized form is ordered by identifier so repeated launches see the
/// same string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClasspathRegistry {
    entries: BTreeMap<String, PathBuf>,
}

impl ClasspathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit's output. Re-registering an identifier with the same
    /// path is a no-op; a different path is a conflict.
    pub fn register(&mut self, unit: &dyn BuildUnit) -> ProvisionResult<()> {
        let path = unit.output_path()?;
        self.insert(unit.identifier(), path)
    }

    pub fn insert(&mut self, identifier: &str, path: PathBuf) -> ProvisionResult<()> {
        let existing = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| path.clone());
        if *existing != path {
            return Err(ProvisionError::StageConflict(format!(
                "project '{}' registered with two outputs: {} and {}",
                identifier,
                existing.display(),
                path.display()
            )));
        }
        debug!("Classpath entry {} -> {:?}", identifier, path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.values().map(PathBuf::as_path)
    }

    /// Join every path with the platform separator.
    pub fn to_property_string(&self) -> String {
        self.paths()
            .map(safe_path_str)
            .collect::<Vec<_>>()
            .join(get_classpath_separator())
    }
}

/// Returns the platform-specific classpath separator.
pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Path text as the JVM expects it.
pub fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // The JVM rejects extended-length (`\\?\C:\...`) classpath entries.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
