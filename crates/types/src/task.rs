//! Task lifecycle management.
//!
//! A [`TaskManager`] collects the handles of the tasks a component spawns so
//! they can be awaited or aborted as a group, which is what makes ordered
//! shutdown possible. A [`TaskSpawner`] is the cloneable handle tasks use to
//! spawn further tasks into the same group.

use crate::Notifier;
use futures::{stream::FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::{fmt, future::Future, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

struct TaskHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({})", self.name)
    }
}

/// Owns a group of spawned tasks.
#[derive(Debug)]
pub struct TaskManager {
    name: String,
    tasks: Arc<Mutex<Vec<TaskHandle>>>,
    /// Fires when any critical task in the group exits.
    critical: Notifier,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new("task manager")
    }
}

impl TaskManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), tasks: Arc::new(Mutex::new(Vec::new())), critical: Notifier::new() }
    }

    /// A cloneable spawner registering into this group.
    pub fn get_spawner(&self) -> TaskSpawner {
        TaskSpawner { tasks: Arc::clone(&self.tasks), critical: self.critical.clone() }
    }

    /// Spawn a task whose exit is unremarkable.
    pub fn spawn_task<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.get_spawner().spawn_task(name, future);
    }

    /// Spawn a task whose exit means the group cannot keep operating.
    pub fn spawn_critical_task<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.get_spawner().spawn_critical_task(name, future);
    }

    /// Run until `shutdown` fires or a critical task exits (which also fires
    /// `shutdown`), then abort whatever is still running.
    pub async fn join_until_exit(&mut self, shutdown: Notifier) {
        let rx_shutdown = shutdown.subscribe();
        let rx_critical = self.critical.subscribe();
        tokio::select! {
            _ = &rx_shutdown => {
                debug!(target: "tasks", manager = %self.name, "shutdown signal");
            }
            _ = &rx_critical => {
                debug!(target: "tasks", manager = %self.name, "critical task exited");
                shutdown.notify();
            }
        }
        self.abort_all_tasks();
    }

    /// Await every registered task. Panicked tasks are logged, not
    /// propagated.
    pub async fn join_all(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        let mut joins: FuturesUnordered<_> = tasks
            .into_iter()
            .map(|task| async move { (task.name, task.handle.await) })
            .collect();
        while let Some((name, result)) = joins.next().await {
            match result {
                Ok(()) => debug!(target: "tasks", manager = %self.name, task = %name, "task finished"),
                Err(e) if e.is_cancelled() => {
                    debug!(target: "tasks", manager = %self.name, task = %name, "task cancelled")
                }
                Err(e) => {
                    error!(target: "tasks", manager = %self.name, task = %name, ?e, "task panicked")
                }
            }
        }
    }

    /// Abort every registered task without waiting for it.
    pub fn abort_all_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.handle.abort();
        }
    }
}

/// Cloneable handle for spawning tasks into a [`TaskManager`]'s group.
#[derive(Clone, Debug)]
pub struct TaskSpawner {
    tasks: Arc<Mutex<Vec<TaskHandle>>>,
    critical: Notifier,
}

impl TaskSpawner {
    pub fn spawn_task<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);
        self.tasks.lock().push(TaskHandle { name, handle });
    }

    pub fn spawn_critical_task<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let critical = self.critical.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            future.await;
            debug!(target: "tasks", task = %task_name, "critical task exiting");
            critical.notify();
        });
        self.tasks.lock().push(TaskHandle { name, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn join_all_waits_for_registered_tasks() {
        let manager = TaskManager::new("test");
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        for i in 0..3 {
            let counter = Arc::clone(&counter);
            manager.spawn_task(format!("task {i}"), async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }
        manager.join_all().await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn critical_exit_triggers_shutdown() {
        let mut manager = TaskManager::new("test");
        let shutdown = Notifier::new();
        manager.spawn_critical_task("short lived", async {});

        tokio::time::timeout(Duration::from_secs(1), manager.join_until_exit(shutdown.clone()))
            .await
            .expect("critical exit observed");
        assert!(shutdown.is_notified());
    }

    #[tokio::test]
    async fn shutdown_aborts_running_tasks() {
        let mut manager = TaskManager::new("test");
        let shutdown = Notifier::new();
        manager.spawn_task("pending forever", std::future::pending());

        shutdown.notify();
        tokio::time::timeout(Duration::from_secs(1), manager.join_until_exit(shutdown))
            .await
            .expect("returns once shutdown fires");
        manager.join_all().await;
    }

    #[tokio::test]
    async fn spawner_registers_into_same_group() {
        let manager = TaskManager::new("test");
        let spawner = manager.get_spawner();
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn_task("inner", async move {
            let _ = tx.send(());
        });
        rx.await.expect("inner task ran");
        manager.join_all().await;
    }
}
