pub mod paths;

pub use paths::PathLayout;
