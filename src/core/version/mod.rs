pub mod server_version;

pub use server_version::ServerVersion;
