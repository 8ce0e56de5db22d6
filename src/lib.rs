mod commands;
pub mod core;
mod signals;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

pub use commands::{execute, load_config, Cli, CommandKind, Overrides};

const DEFAULT_LOG_FILTER: &str = "info,spigot_runner_lib=debug";

/// Initialise structured logging. `RUST_LOG` wins over `level`.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LOG_FILTER)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Parse the command line, run it, and return the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    tracing::info!("spigot-runner {} starting...", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start the async runtime: {}", e);
            return 1;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(failure) => {
            error!("{}", failure);
            1
        }
    }
}
