//! Background task tracker.
//!
//! Tasks run on their own worker threads. All task state lives in one map
//! behind one mutex; cancellation is a flag the job polls.

use crate::domain::error::StockpickError;
use crate::domain::recommend::{PipelineObserver, Progress};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{error, info};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub progress: usize,
    pub total: usize,
    pub phase: Option<String>,
    pub message: String,
    pub current_stock: Option<String>,
    pub result_summary: Option<String>,
    pub error: Option<String>,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

/// How a job ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(String),
    Cancelled(String),
}

struct TaskEntry {
    seq: u64,
    snapshot: TaskSnapshot,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

type TaskMap = Arc<Mutex<HashMap<TaskId, TaskEntry>>>;

fn lock(tasks: &TaskMap) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Given to a running job for progress reports and cancellation checks.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    tasks: TaskMap,
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn report(
        &self,
        current: usize,
        total: usize,
        phase: &str,
        message: impl Into<String>,
        stock: Option<String>,
    ) {
        self.update(|s| {
            s.progress = current;
            s.total = total;
            s.phase = Some(phase.to_string());
            s.message = message.into();
            s.current_stock = stock;
        });
    }

    fn update(&self, f: impl FnOnce(&mut TaskSnapshot)) {
        if let Some(entry) = lock(&self.tasks).get_mut(&self.id) {
            f(&mut entry.snapshot);
        }
    }
}

impl PipelineObserver for TaskHandle {
    fn on_progress(&self, p: &Progress<'_>) {
        let stock = p.stock.map(|c| format!("{} {}", c.symbol, c.name));
        self.report(p.current, p.total, &p.phase.to_string(), p.message.clone(), stock);
    }

    fn is_cancelled(&self) -> bool {
        TaskHandle::is_cancelled(self)
    }
}

#[derive(Clone, Default)]
pub struct TaskTracker {
    tasks: TaskMap,
    seq: Arc<AtomicU64>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` on a new worker thread and return its task id.
    pub fn spawn<F>(&self, name: &str, job: F) -> Result<TaskId, StockpickError>
    where
        F: FnOnce(&TaskHandle) -> Result<TaskOutcome, StockpickError> + Send + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        lock(&self.tasks).insert(
            id.clone(),
            TaskEntry {
                seq,
                snapshot: TaskSnapshot {
                    id: id.clone(),
                    name: name.to_string(),
                    status: TaskStatus::Pending,
                    progress: 0,
                    total: 0,
                    phase: None,
                    message: "waiting to start".to_string(),
                    current_stock: None,
                    result_summary: None,
                    error: None,
                    started_at: now(),
                    finished_at: None,
                },
                cancel: Arc::clone(&cancel),
                worker: None,
            },
        );

        let handle = TaskHandle {
            id: id.clone(),
            tasks: Arc::clone(&self.tasks),
            cancel,
        };
        let worker = std::thread::Builder::new()
            .name(format!("task-{}", &id[..8]))
            .spawn(move || run_job(handle, job));

        let mut tasks = lock(&self.tasks);
        match worker {
            Ok(worker) => {
                if let Some(entry) = tasks.get_mut(&id) {
                    entry.worker = Some(worker);
                }
                info!(task = %id, name, "task started");
                Ok(id)
            }
            Err(e) => {
                tasks.remove(&id);
                Err(StockpickError::Task {
                    task_id: id,
                    reason: format!("failed to start worker: {e}"),
                })
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<TaskSnapshot> {
        lock(&self.tasks).get(id).map(|e| e.snapshot.clone())
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let tasks = lock(&self.tasks);
        let mut entries: Vec<&TaskEntry> = tasks.values().collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries.into_iter().map(|e| e.snapshot.clone()).collect()
    }

    /// Request cancellation. False for unknown or already finished tasks.
    pub fn cancel(&self, id: &str) -> bool {
        let tasks = lock(&self.tasks);
        match tasks.get(id) {
            Some(entry) if !entry.snapshot.status.is_finished() => {
                entry.cancel.store(true, Ordering::SeqCst);
                info!(task = %id, "task cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Block until the task's worker exits and return its final state.
    pub fn wait(&self, id: &str) -> Result<TaskSnapshot, StockpickError> {
        let worker = {
            let mut tasks = lock(&self.tasks);
            let entry = tasks.get_mut(id).ok_or_else(|| StockpickError::Task {
                task_id: id.to_string(),
                reason: "unknown task".to_string(),
            })?;
            entry.worker.take()
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(task = %id, "task worker panicked");
                let mut tasks = lock(&self.tasks);
                if let Some(entry) = tasks.get_mut(id) {
                    entry.snapshot.status = TaskStatus::Failed;
                    entry.snapshot.error = Some("worker panicked".to_string());
                    entry.snapshot.finished_at = Some(now());
                }
            }
        }
        self.get(id).ok_or_else(|| StockpickError::Task {
            task_id: id.to_string(),
            reason: "unknown task".to_string(),
        })
    }
}

fn run_job<F>(handle: TaskHandle, job: F)
where
    F: FnOnce(&TaskHandle) -> Result<TaskOutcome, StockpickError>,
{
    handle.update(|s| {
        s.status = TaskStatus::Running;
        s.message = "running".to_string();
    });
    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&handle)));
    if result.is_err() {
        error!(task = %handle.id, "task worker panicked");
    }
    handle.update(|s| {
        s.finished_at = Some(now());
        s.current_stock = None;
        match result {
            Err(_) => {
                s.status = TaskStatus::Failed;
                s.message = "worker panicked".to_string();
                s.error = Some("worker panicked".to_string());
            }
            Ok(Ok(TaskOutcome::Completed(summary))) => {
                s.status = TaskStatus::Completed;
                s.message = summary.clone();
                s.result_summary = Some(summary);
            }
            Ok(Ok(TaskOutcome::Cancelled(message))) => {
                s.status = TaskStatus::Cancelled;
                s.message = message;
            }
            Ok(Err(e)) => {
                s.status = TaskStatus::Failed;
                s.message = e.to_string();
                s.error = Some(e.to_string());
            }
        }
    });
    if let Some(snapshot) = lock(&handle.tasks).get(&handle.id).map(|e| e.snapshot.clone()) {
        info!(task = %snapshot.id, status = %snapshot.status, "task finished");
    }
}
