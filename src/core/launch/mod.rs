pub mod classpath;
pub mod environment;
pub mod task;

pub use classpath::{get_classpath_separator, ClasspathRegistry};
pub use environment::{write_eula_acceptance, EULA_FILE};
pub use task::{
    build_server_args, LaunchSpec, LaunchState, ServerLauncher, DEFAULT_SHUTDOWN_GRACE, NOGUI_FLAG,
};
