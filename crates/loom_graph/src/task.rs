// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation and background evaluation tasks.

use crate::action::Subject;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::NodeId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Shared cancellation flag, polled at coarse-grained points
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    cancelled: Arc<AtomicBool>,
}

impl Canceller {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GraphError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// State of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Still running
    Running,
    /// Finished normally
    Completed,
    /// Stopped after observing cancellation
    Cancelled,
    /// Finished with an error
    Errored,
}

struct TaskShared {
    subject: Subject,
    /// Nodes the task reads; `None` reads the whole graph
    reads: Option<HashSet<NodeId>>,
    canceller: Canceller,
    status: Mutex<TaskStatus>,
    finished: Condvar,
    error: Mutex<Option<GraphError>>,
}

impl TaskShared {
    fn reads(&self, subject: Subject) -> bool {
        match (&self.reads, subject) {
            (None, _) | (_, Subject::Graph) => true,
            (Some(nodes), Subject::Node(node)) => nodes.contains(&node),
        }
    }

    fn status(&self) -> TaskStatus {
        *self.status.lock()
    }

    fn finish(&self, result: Result<()>) {
        let status = match result {
            Ok(()) if self.canceller.is_cancelled() => TaskStatus::Cancelled,
            Ok(()) => TaskStatus::Completed,
            Err(GraphError::Cancelled) => TaskStatus::Cancelled,
            Err(err) => {
                tracing::error!("Background task for {:?} failed: {}", self.subject, err);
                *self.error.lock() = Some(err);
                TaskStatus::Errored
            }
        };
        *self.status.lock() = status;
        self.finished.notify_all();
    }

    fn wait(&self) -> TaskStatus {
        let mut status = self.status.lock();
        while *status == TaskStatus::Running {
            self.finished.wait(&mut status);
        }
        *status
    }
}

/// Work running on its own thread against a graph. Dropping the handle
/// cancels the task and waits for it.
pub struct BackgroundTask {
    shared: Arc<TaskShared>,
}

impl BackgroundTask {
    pub(crate) fn spawn<F>(graph: &Graph, subject: Subject, work: F) -> Self
    where
        F: FnOnce(&Graph, &Canceller) -> Result<()> + Send + 'static,
    {
        let reads = match subject {
            Subject::Graph => None,
            Subject::Node(node) => Some(graph.read().upstream_nodes(node)),
        };
        let shared = Arc::new(TaskShared {
            subject,
            reads,
            canceller: Canceller::new(),
            status: Mutex::new(TaskStatus::Running),
            finished: Condvar::new(),
            error: Mutex::new(None),
        });
        graph.shared.tasks.register(&shared);

        let worker = shared.clone();
        let graph = graph.clone();
        let spawned = std::thread::Builder::new()
            .name("loom-background".to_string())
            .spawn(move || {
                let result = work(&graph, &worker.canceller);
                worker.finish(result);
            });
        if let Err(err) = spawned {
            shared.finish(Err(GraphError::evaluation(format!("failed to spawn thread: {err}"))));
        }

        Self { shared }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.shared.canceller.cancel();
    }

    /// Block until the task finishes
    pub fn wait(&self) -> TaskStatus {
        self.shared.wait()
    }

    /// Cancel and block until the task finishes
    pub fn cancel_and_wait(&self) -> TaskStatus {
        self.cancel();
        self.wait()
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        self.shared.status()
    }

    /// Error of an errored task
    pub fn error(&self) -> Option<GraphError> {
        self.shared.error.lock().clone()
    }

    /// Cancellation token of the task
    pub fn canceller(&self) -> &Canceller {
        &self.shared.canceller
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel_and_wait();
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("subject", &self.shared.subject)
            .field("status", &self.status())
            .finish()
    }
}

/// Tasks running against one graph
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: Mutex<Vec<Weak<TaskShared>>>,
}

impl TaskRegistry {
    fn register(&self, task: &Arc<TaskShared>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| t.upgrade().is_some_and(|t| t.status() == TaskStatus::Running));
        tasks.push(Arc::downgrade(task));
    }

    /// Cancel every running task that reads `subject`, then wait for them
    pub(crate) fn cancel_affected(&self, subject: Subject) {
        let affected: Vec<Arc<TaskShared>> = self
            .tasks
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|t| t.status() == TaskStatus::Running && t.reads(subject))
            .collect();
        if affected.is_empty() {
            return;
        }
        tracing::debug!("Cancelling {} background task(s) for {:?}", affected.len(), subject);
        for task in &affected {
            task.canceller.cancel();
        }
        for task in &affected {
            task.wait();
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|t| t.status() == TaskStatus::Running)
            .count()
    }
}
