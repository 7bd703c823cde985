//! Stop coordination
//!
//! A run has one [`ShutdownCoordinator`]. Every worker holds a
//! [`ShutdownListener`] to observe the stop signal at its suspension points
//! and a [`TaskGuard`] that keeps it counted as active until it returns.
//! Signals only escalate: once `Forced` is raised, `Graceful` is ignored.

use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Stop signal types with escalating urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownSignal {
    /// Finish the in-flight request, then stop issuing new ones
    Graceful,
    /// Stragglers are about to be aborted
    Forced,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

#[derive(Debug, Default)]
struct TaskCounter {
    active: AtomicUsize,
    idle: Notify,
}

/// Stop coordinator shared by a run and all of its workers
#[derive(Debug)]
pub struct ShutdownCoordinator {
    sender: watch::Sender<Option<ShutdownSignal>>,
    tasks: Arc<TaskCounter>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender,
            tasks: Arc::new(TaskCounter::default()),
        }
    }

    /// Raise `signal`. Returns false if an equal or stronger signal was already raised.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        let raised = self.sender.send_if_modified(|current| match current {
            Some(existing) if *existing >= signal => false,
            _ => {
                *current = Some(signal);
                true
            }
        });
        if raised {
            info!("Stop signal raised: {}", signal);
        }
        raised
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.sender.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.signal().is_some()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Count a task as active until the returned guard drops
    pub fn task_guard(&self) -> TaskGuard {
        self.tasks.active.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            tasks: self.tasks.clone(),
        }
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.active.load(Ordering::SeqCst)
    }

    /// Wait until no task is active. Returns false if `timeout` elapses first.
    pub async fn wait_for_tasks(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.tasks.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a concurrent drop is not missed
                notified.as_mut().enable();
                if self.active_task_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Raise `Graceful`, wait up to `grace` for tasks to finish, then escalate
    /// to `Forced`. The caller is responsible for aborting what remains.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.trigger(ShutdownSignal::Graceful);

        if self.wait_for_tasks(grace).await {
            info!("All tasks stopped gracefully");
            return Ok(());
        }

        self.trigger(ShutdownSignal::Forced);
        let remaining = self.active_task_count();
        if remaining == 0 {
            return Ok(());
        }
        warn!("Stop timeout elapsed with {} tasks still active", remaining);
        Err(ShutdownError::TasksRemaining(remaining))
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task view of the stop signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    pub fn is_stopped(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Resolves once any stop signal is raised or the coordinator is gone
    pub async fn stopped(&mut self) {
        let _ = self.receiver.wait_for(|signal| signal.is_some()).await;
    }
}

/// Keeps a task counted as active
#[derive(Debug)]
pub struct TaskGuard {
    tasks: Arc<TaskCounter>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.tasks.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tasks.idle.notify_waiters();
        }
    }
}

/// Stop error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Stop completed with {0} tasks still active")]
    TasksRemaining(usize),
}
