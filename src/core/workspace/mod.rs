pub mod cleanup;
pub mod snapshot;
pub mod stager;

pub use cleanup::clear_children;
pub use snapshot::{SnapshotCache, SNAPSHOT_ENTRIES};
pub use stager::{staged_file_name, PluginStager, STAGED_PREFIX};
