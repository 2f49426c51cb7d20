pub mod classpath;
pub mod command;
pub mod supervisor;

pub use classpath::{build_classpath, ensure_artifacts_present, extract_natives};
pub use command::{
    build, parse_extra_args, prepare_working_dir, validate_extra_args, GcPolicy, LaunchCommand,
    LaunchContext, MemorySettings,
};
pub use supervisor::{LaunchedProcess, ProcessInfo, ProcessStatus, ProcessSupervisor};
