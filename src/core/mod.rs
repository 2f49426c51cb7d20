// ─── VoxelLauncher Core ───
// Acquisition and launch pipeline for Minecraft versions.
//
// Architecture:
//   core/
//     version/     Manifest cache, version JSON, platform rules, mirrors
//     resolver/    Platform-specific artifact graph
//     loaders/     Fabric, Forge, NeoForge, OptiFine manifests + merge
//     maven/       Maven coordinate parser
//     downloader/  Concurrent, resumable downloads with SHA-1 validation
//     assets/      Asset index + content-addressed objects
//     install/     Staged install pipeline
//     progress/    Install task progress store
//     instance/    Installed-version registry + on-disk layout
//     launch/      Classpath, natives, command builder, process supervisor
//     auth/        Launch identity
//     java/        Java binary selection
//     state/       Settings + shared application state

pub mod assets;
pub mod atomic;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod instance;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod maven;
pub mod progress;
pub mod resolver;
pub mod state;
pub mod version;
