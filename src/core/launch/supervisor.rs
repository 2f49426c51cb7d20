// ─── Process Supervisor ───
// Starts the game and keeps track of it until it exits.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::command::LaunchCommand;
use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Exited { code: Option<i32> },
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchedProcess {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub version_id: String,
    pub started_at: DateTime<Utc>,
    pub status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct ProcessSupervisor {
    processes: Arc<RwLock<HashMap<u32, ProcessInfo>>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the game and return once the OS has handed back a pid.
    /// Output is drained on blocking threads and the exit code recorded
    /// in the background.
    pub fn launch(&self, command: &LaunchCommand, version_id: &str) -> LauncherResult<LaunchedProcess> {
        let mut cmd = Command::new(&command.executable);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("Launching {} with {:?}", version_id, command.executable);
        debug!("Command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| LauncherError::Launch {
            program: command.executable.clone(),
            source,
        })?;
        let pid = child.id();

        self.write().insert(
            pid,
            ProcessInfo {
                pid,
                version_id: version_id.to_string(),
                started_at: Utc::now(),
                status: ProcessStatus::Running,
                exited_at: None,
            },
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::task::spawn_blocking(move || {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    info!("[mc:{}][stdout] {}", pid, line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::task::spawn_blocking(move || {
                let mut hinted = false;
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    warn!("[mc:{}][stderr] {}", pid, line);
                    if let Some(hint) = stderr_hint(&line).filter(|_| !hinted) {
                        hinted = true;
                        error!("[mc:{}] {}", pid, hint);
                    }
                }
            });
        }

        let processes = Arc::clone(&self.processes);
        let version = version_id.to_string();
        tokio::spawn(async move {
            let wait_result = tokio::task::spawn_blocking(move || child.wait())
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))
                .and_then(|result| result);

            let code = match wait_result {
                Ok(status) => {
                    if status.success() {
                        info!("Minecraft {} (pid {}) exited cleanly", version, pid);
                    } else {
                        error!("Minecraft {} (pid {}) exited with {:?}", version, pid, status);
                    }
                    status.code()
                }
                Err(err) => {
                    error!("Lost track of pid {}: {}", pid, err);
                    None
                }
            };

            if let Some(record) = processes
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&pid)
            {
                record.status = ProcessStatus::Exited { code };
                record.exited_at = Some(Utc::now());
            }
        });

        Ok(LaunchedProcess { pid })
    }

    /// Tracked children first. Anything else is looked up in the OS
    /// process table.
    pub fn status(&self, pid: u32) -> ProcessStatus {
        if let Some(record) = self.read().get(&pid) {
            return record.status;
        }

        let system = sysinfo::System::new_all();
        if system.process(sysinfo::Pid::from_u32(pid)).is_some() {
            ProcessStatus::Running
        } else {
            ProcessStatus::Unknown
        }
    }

    pub fn info(&self, pid: u32) -> Option<ProcessInfo> {
        self.read().get(&pid).cloned()
    }

    /// Tracked processes that have not exited yet, oldest first.
    pub fn running(&self) -> Vec<ProcessInfo> {
        let mut running: Vec<ProcessInfo> = self
            .read()
            .values()
            .filter(|p| p.status == ProcessStatus::Running)
            .cloned()
            .collect();
        running.sort_by_key(|p| p.started_at);
        running
    }

    /// Forget processes that exited more than `retention` before `now`.
    pub fn prune(&self, now: DateTime<Utc>, retention: std::time::Duration) -> usize {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut processes = self.write();
        let before = processes.len();
        processes.retain(|_, record| match record.exited_at {
            Some(exited_at) => now - exited_at <= retention,
            None => true,
        });
        let removed = before - processes.len();
        if removed > 0 {
            debug!("Pruned {} exited processes", removed);
        }
        removed
    }

    pub fn spawn_pruner(
        &self,
        every: std::time::Duration,
        retention: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                supervisor.prune(Utc::now(), retention);
            }
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u32, ProcessInfo>> {
        self.processes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, ProcessInfo>> {
        self.processes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Failure signatures that deserve a pointer to the fix.
fn stderr_hint(line: &str) -> Option<&'static str> {
    if line.contains("ZipException: zip END header not found") {
        return Some("A library archive is corrupted; reinstall the version to fetch it again");
    }
    if line.contains("UnsupportedClassVersionError") {
        return Some("The selected Java is older than this version requires");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_executable_surfaces_os_error() {
        let supervisor = ProcessSupervisor::new();
        let command = LaunchCommand {
            executable: PathBuf::from("/definitely/not/a/java"),
            args: vec![],
            working_dir: std::env::temp_dir(),
        };
        let err = supervisor.launch(&command, "1.21.1").unwrap_err();
        match err {
            LauncherError::Launch { program, source } => {
                assert_eq!(program, PathBuf::from("/definitely/not/a/java"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(supervisor.running().is_empty());
    }

    #[test]
    fn known_crashes_get_a_hint() {
        assert!(stderr_hint("java.util.zip.ZipException: zip END header not found").is_some());
        assert!(stderr_hint("java.lang.UnsupportedClassVersionError: net/minecraft/client/main/Main").is_some());
        assert!(stderr_hint("[Render thread/INFO]: Setting user: Steve").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_recorded() {
        let supervisor = ProcessSupervisor::new();
        let command = LaunchCommand {
            executable: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo started; echo oops >&2; exit 3".into()],
            working_dir: std::env::temp_dir(),
        };
        let launched = supervisor.launch(&command, "1.21.1").unwrap();
        assert_eq!(supervisor.info(launched.pid).unwrap().version_id, "1.21.1");

        let mut status = supervisor.status(launched.pid);
        for _ in 0..100 {
            if status != ProcessStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            status = supervisor.status(launched.pid);
        }
        assert_eq!(status, ProcessStatus::Exited { code: Some(3) });
        assert!(supervisor.info(launched.pid).unwrap().exited_at.is_some());
        assert!(supervisor.running().is_empty());
    }

    #[test]
    fn prune_forgets_only_long_exited_processes() {
        let supervisor = ProcessSupervisor::new();
        let now = Utc::now();
        let record = |pid: u32, status: ProcessStatus, exited_at: Option<DateTime<Utc>>| ProcessInfo {
            pid,
            version_id: "1.21.1".into(),
            started_at: now - chrono::Duration::minutes(30),
            status,
            exited_at,
        };
        {
            let mut processes = supervisor.write();
            processes.insert(1, record(1, ProcessStatus::Running, None));
            processes.insert(
                2,
                record(2, ProcessStatus::Exited { code: Some(0) }, Some(now - chrono::Duration::minutes(20))),
            );
            processes.insert(
                3,
                record(3, ProcessStatus::Exited { code: Some(1) }, Some(now - chrono::Duration::seconds(5))),
            );
        }

        assert_eq!(supervisor.prune(now, Duration::from_secs(600)), 1);
        assert!(supervisor.info(1).is_some());
        assert!(supervisor.info(2).is_none());
        assert!(supervisor.info(3).is_some());
        assert_eq!(supervisor.prune(now, Duration::from_secs(600)), 0);
    }
}
