// ─── Plugin Stager ───
// Copies the build outputs of the projects under test into the server's plugins folder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures_util::{stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::core::config::BuildUnit;
use crate::core::error::{ProvisionError, ProvisionResult};

/// Prefix of every staged jar; anything else in `plugins/` is left alone.
pub const STAGED_PREFIX: &str = "runSpigotServer-";

const PARALLEL_COPIES: usize = 4;

/// `runSpigotServer-<identifier>.jar`
pub fn staged_file_name(identifier: &str) -> String {
    format!("{}{}.jar", STAGED_PREFIX, identifier)
}

pub struct PluginStager;

impl PluginStager {
    /// Copy each unit's output into `dest_dir`, overwriting earlier copies.
    ///
    /// All identifiers are validated before anything is copied. Returns the
    /// staged paths in input order.
    #[instrument(skip(units), fields(count = units.len()))]
    pub async fn stage<U>(units: &[U], dest_dir: &Path) -> ProvisionResult<Vec<PathBuf>>
    where
        U: BuildUnit,
    {
        check_identifiers(units)?;

        let mut copies = Vec::with_capacity(units.len());
        for unit in units {
            let source = unit.output_path()?;
            let dest = dest_dir.join(staged_file_name(unit.identifier()));
            copies.push((unit.identifier().to_string(), source, dest));
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ProvisionError::io(dest_dir, e))?;

        let results = stream::iter(copies.into_iter().enumerate())
            .map(|(index, (identifier, source, dest))| async move {
                tokio::fs::copy(&source, &dest)
                    .await
                    .map_err(|e| ProvisionError::io(&dest, e))?;
                debug!("Staged {} -> {:?}", identifier, dest);

                let check_path = source.clone();
                let has_descriptor =
                    tokio::task::spawn_blocking(move || has_plugin_descriptor(&check_path))
                        .await?;
                if !has_descriptor {
                    warn!(
                        "{:?} (project '{}') has no plugin.yml or paper-plugin.yml; the server will not load it",
                        source, identifier
                    );
                }

                Ok::<_, ProvisionError>((index, dest))
            })
            .buffer_unordered(PARALLEL_COPIES)
            .collect::<Vec<_>>()
            .await;

        let mut staged = Vec::with_capacity(results.len());
        for result in results {
            staged.push(result?);
        }
        staged.sort_by_key(|(index, _)| *index);

        info!("Staged {} plugin jars into {:?}", staged.len(), dest_dir);
        Ok(staged.into_iter().map(|(_, dest)| dest).collect())
    }
}

fn check_identifiers<U: BuildUnit>(units: &[U]) -> ProvisionResult<()> {
    let mut seen = HashSet::new();

    for unit in units {
        let identifier = unit.identifier();
        if identifier.trim().is_empty()
            || identifier.contains(['/', '\\'])
            || identifier == "."
            || identifier == ".."
        {
            return Err(ProvisionError::StageConflict(format!(
                "invalid project identifier {:?}",
                identifier
            )));
        }

        // Staged names collide on case-insensitive filesystems.
        let key = if cfg!(any(target_os = "windows", target_os = "macos")) {
            identifier.to_lowercase()
        } else {
            identifier.to_string()
        };
        if !seen.insert(key) {
            return Err(ProvisionError::StageConflict(format!(
                "two projects would both be staged as {}",
                staged_file_name(identifier)
            )));
        }
    }

    Ok(())
}

/// Whether `jar` carries a Bukkit or Paper plugin descriptor at its root.
fn has_plugin_descriptor(jar: &Path) -> bool {
    let file = match std::fs::File::open(jar) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("{:?} is not a readable jar: {}", jar, e);
            return false;
        }
    };

    ["plugin.yml", "paper-plugin.yml"]
        .iter()
        .any(|name| archive.by_name(name).is_ok())
}
