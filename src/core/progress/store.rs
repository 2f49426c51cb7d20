use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Install stages in execution order, plus the two terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VersionInfo,
    ClientJar,
    Libraries,
    Assets,
    Complete,
    Error,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }
}

/// Snapshot of one install as seen by a poller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallTask {
    pub task_id: String,
    pub stage: Stage,
    pub percentage: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cooperative cancellation flag shared between the store and a worker.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    task_id: Arc<str>,
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: Arc::from(task_id),
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A flag not tied to any stored task.
    pub fn detached() -> Self {
        Self::new("")
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

struct Entry {
    task: InstallTask,
    cancel: CancelFlag,
}

/// In-memory map from task id to install progress.
///
/// Each write replaces the whole snapshot under the lock, so readers never
/// see a stage from one update paired with a percentage from another.
#[derive(Clone)]
pub struct ProgressStore {
    tasks: Arc<RwLock<HashMap<String, Entry>>>,
    updates: broadcast::Sender<InstallTask>,
    retention: Duration,
}

impl ProgressStore {
    pub fn new(retention: Duration) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            updates,
            retention,
        }
    }

    /// Register a task at the start of an install. Reusing an id replaces
    /// the previous entry.
    pub fn create(&self, task_id: &str) -> TaskReporter {
        let now = Utc::now();
        let task = InstallTask {
            task_id: task_id.to_string(),
            stage: Stage::VersionInfo,
            percentage: 0,
            message: "Queued".into(),
            created_at: now,
            updated_at: now,
        };
        let cancel = CancelFlag::new(task_id);

        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                task_id.to_string(),
                Entry {
                    task: task.clone(),
                    cancel: cancel.clone(),
                },
            );
        let _ = self.updates.send(task);

        TaskReporter {
            store: self.clone(),
            cancel,
            task_id: task_id.to_string(),
            stage: Stage::VersionInfo,
            last_percentage: 0,
        }
    }

    pub fn get(&self, task_id: &str) -> Option<InstallTask> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .map(|entry| entry.task.clone())
    }

    /// Request cooperative cancellation. Returns `false` for unknown or
    /// already finished tasks.
    pub fn cancel(&self, task_id: &str) -> bool {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        match tasks.get(task_id) {
            Some(entry) if !entry.task.stage.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Stream of every accepted update, across all tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<InstallTask> {
        self.updates.subscribe()
    }

    fn write(&self, task_id: &str, stage: Stage, percentage: u8, message: String) {
        let snapshot = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = tasks.get_mut(task_id) else {
                return;
            };
            if entry.task.stage.is_terminal() {
                return;
            }
            // Percentages only move forward within a stage.
            let percentage = if entry.task.stage == stage {
                percentage.max(entry.task.percentage)
            } else {
                percentage
            };
            entry.task.stage = stage;
            entry.task.percentage = percentage.min(100);
            entry.task.message = message;
            entry.task.updated_at = Utc::now();
            entry.task.clone()
        };
        let _ = self.updates.send(snapshot);
    }

    /// Drop terminal tasks whose last update is older than the retention window.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, entry| {
            !(entry.task.stage.is_terminal() && now - entry.task.updated_at > retention)
        });
        let removed = before - tasks.len();
        if removed > 0 {
            debug!("Pruned {} finished install tasks", removed);
        }
        removed
    }

    /// Prune on a fixed interval for as long as the runtime lives.
    pub fn spawn_pruner(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                store.prune(Utc::now());
            }
        })
    }
}

/// Write handle held by the worker driving one install.
pub struct TaskReporter {
    store: ProgressStore,
    cancel: CancelFlag,
    task_id: String,
    stage: Stage,
    last_percentage: u8,
}

impl TaskReporter {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Enter a new stage at 0%.
    pub fn begin(&mut self, stage: Stage, message: impl Into<String>) {
        self.stage = stage;
        self.last_percentage = 0;
        self.store.write(&self.task_id, stage, 0, message.into());
    }

    /// Report `done` of `total` within the current stage. Only publishes
    /// when the rounded percentage actually changes.
    pub fn advance(&mut self, done: usize, total: usize, message: impl Into<String>) {
        let percentage = percent(done, total);
        if percentage <= self.last_percentage {
            return;
        }
        self.last_percentage = percentage;
        self.store
            .write(&self.task_id, self.stage, percentage, message.into());
    }

    /// Mark the current stage finished.
    pub fn finish_stage(&mut self, message: impl Into<String>) {
        self.last_percentage = 100;
        self.store.write(&self.task_id, self.stage, 100, message.into());
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        self.stage = Stage::Complete;
        self.store
            .write(&self.task_id, Stage::Complete, 100, message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let percentage = self.last_percentage;
        self.stage = Stage::Error;
        self.store
            .write(&self.task_id, Stage::Error, percentage, message.into());
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = done.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}
