pub mod artifact;
pub mod builder;
pub mod fetcher;
pub mod process;

pub use artifact::{ArtifactRecord, SpigotJarArtifact};
pub use builder::ServerBuilder;
pub use fetcher::{BuildToolFetcher, HttpToolSource, ToolSource, BUILD_TOOLS_JAR, BUILD_TOOLS_URL};
pub use process::{Invocation, ProcessOutput, ProcessRunner, SystemProcessRunner};
