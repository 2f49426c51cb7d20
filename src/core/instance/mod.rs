// ─── Installed-Version Registry ───

pub mod manager;
pub mod model;

pub use manager::{validate_version_name, VersionRegistry};
pub use model::{GameLayout, InstalledVersion};
