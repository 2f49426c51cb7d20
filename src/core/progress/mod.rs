mod store;

pub use store::{CancelFlag, InstallTask, ProgressStore, Stage, TaskReporter};
