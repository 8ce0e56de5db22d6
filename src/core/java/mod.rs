pub mod disk;
pub mod selection;

pub use disk::{available_space, warn_if_low_disk_space, BUILD_MIN_FREE_BYTES};
pub use selection::JavaRuntime;
