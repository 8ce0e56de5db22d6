pub mod model;
pub mod project;

pub use model::{ProvisioningConfig, CONFIG_FILE_NAME, DEFAULT_CLASSPATH_PROPERTY};
pub use project::{BuildUnit, ProjectRef};
