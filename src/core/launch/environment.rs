use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

pub const EULA_FILE: &str = "eula.txt";
const EULA_ACCEPTED: &str = "eula=true\n";

/// Write `eula.txt` accepting the server license. Always overwrites.
pub async fn write_eula_acceptance(work_dir: &Path) -> ProvisionResult<PathBuf> {
    let path = work_dir.join(EULA_FILE);
    tokio::fs::write(&path, EULA_ACCEPTED)
        .await
        .map_err(|e| ProvisionError::io(&path, e))?;
    debug!("Accepted eula at {:?}", path);
    Ok(path)
}
