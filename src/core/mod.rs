// ─── Spigot Runner Core ───
// Provisions a throwaway Spigot server for testing plugin builds.
//
// Architecture:
//   core/
//     config/     — spigot-runner.json model + build-unit contract
//     version/    — Server version parsing and Java requirements
//     layout/     — spigotServer/{work,snapshot,build-tools}
//     downloader/ — Verified downloads with SHA-1 validation
//     buildtools/ — BuildTools fetch, subprocess runner, jar cache
//     java/       — Java executable selection, disk checks
//     workspace/  — Cleanup, plugin staging, snapshot cache
//     launch/     — Classpath registry, eula, server process
//     pipeline    — Stage ordering and failure tagging

pub mod buildtools;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod layout;
pub mod pipeline;
pub mod version;
pub mod workspace;
