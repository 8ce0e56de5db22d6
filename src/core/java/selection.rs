// ─── Java Selection ───
// Picks the java executable used for BuildTools and the server.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A java executable together with the major version it was chosen for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
    pub major: u32,
    pub binary: PathBuf,
}

impl JavaRuntime {
    /// Resolve from the process environment.
    ///
    /// Order: explicit `java_home`, then `JAVA_HOME_<major>_X64`,
    /// `JAVA_HOME_<major>`, `JAVA<major>_HOME`, then `JAVA_HOME`, then
    /// `java` on `PATH`. Homes without a `bin/java` are skipped.
    pub fn resolve(major: u32, java_home: Option<&Path>) -> Self {
        Self::resolve_with(major, java_home, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        major: u32,
        java_home: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        if let Some(home) = java_home {
            let binary = java_in_home(home);
            if binary.is_file() {
                return Self { major, binary };
            }
            warn!("Configured javaHome {:?} has no {}", home, java_exe());
        }

        let keys = java_home_keys(major);
        for key in &keys {
            let Some(home) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let binary = java_in_home(Path::new(&home));
            if binary.is_file() {
                debug!("Using java from {}={}", key, home);
                return Self { major, binary };
            }
        }

        warn!(
            "No Java {} found (javaHome, {}); using `{}` from PATH, which may be a different version",
            major,
            keys.join(", "),
            java_exe()
        );
        Self {
            major,
            binary: PathBuf::from(java_exe()),
        }
    }
}

/// Environment variables checked for a Java home, most specific first.
fn java_home_keys(major: u32) -> [String; 4] {
    [
        format!("JAVA_HOME_{}_X64", major),
        format!("JAVA_HOME_{}", major),
        format!("JAVA{}_HOME", major),
        "JAVA_HOME".to_string(),
    ]
}

fn java_in_home(home: &Path) -> PathBuf {
    home.join("bin").join(java_exe())
}

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}
