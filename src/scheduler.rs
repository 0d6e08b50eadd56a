//! One-off submission and periodic poll scheduling
//!
//! Work runs on a bounded dispatch pool (semaphore permits over the tokio
//! runtime); callbacks run on their own smaller pool so slow consumers never
//! hold a dispatch slot. Periodic polls tick at a fixed rate: an overrunning
//! execution makes the following ticks fire back-to-back until the schedule
//! has caught up, while the connection pool keeps same-endpoint executions
//! serial.
//!
//! The poll registry is keyed by task identity. Registering an already
//! registered task atomically cancels the old schedule and installs the new
//! one; unregistering flips the poll's active flag (observed at every retry
//! boundary), aborts the loop, and pushes the endpoint's connections toward
//! disconnect-on-return.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::pool::ConnectionPool;
use crate::task::Task;

/// Default size of the dispatch worker pool.
pub const DEFAULT_DISPATCH_WORKERS: usize = 10;

/// Default size of the callback worker pool.
pub const DEFAULT_CALLBACK_WORKERS: usize = 5;

/// Handle to a submitted one-off task.
///
/// Cancelling prevents execution when the task has not started; an attempt
/// already on the wire is interrupted at its next await point and its
/// connection is discarded, not force-closed mid-read.
pub struct CancelHandle {
    handle: JoinHandle<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// True once the task ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// A registered periodic poll, as reported by the registry.
#[derive(Debug, Clone)]
pub struct RegisteredPoll {
    pub task: Task,
    pub period: Duration,
    pub initial_delay: Duration,
    pub registered_at: DateTime<Utc>,
}

struct PollEntry {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    period: Duration,
    initial_delay: Duration,
    registered_at: DateTime<Utc>,
}

/// Schedules one-off and periodic work onto the dispatch pool.
pub(crate) struct Scheduler {
    executor: Arc<Executor>,
    pool: Arc<ConnectionPool>,
    dispatch_permits: Arc<Semaphore>,
    registry: Mutex<HashMap<Task, PollEntry>>,
}

impl Scheduler {
    pub fn new(
        executor: Arc<Executor>,
        pool: Arc<ConnectionPool>,
        dispatch_permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            executor,
            pool,
            dispatch_permits,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Run `task` once, as soon as a dispatch slot frees up.
    pub fn submit_one_time(&self, task: Task) -> CancelHandle {
        let executor = self.executor.clone();
        let permits = self.dispatch_permits.clone();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            executor.run(&task, None).await;
        });
        CancelHandle { handle }
    }

    /// Install a fixed-rate poll. A poll for the same task replaces the
    /// previous schedule; the swap is atomic under the registry lock.
    pub fn register_regular_poll(&self, task: Task, period: Duration, initial_delay: Duration) {
        let active = Arc::new(AtomicBool::new(true));
        let handle = self.spawn_poll_loop(task.clone(), period, initial_delay, active.clone());

        let entry = PollEntry {
            active,
            handle,
            period,
            initial_delay,
            registered_at: Utc::now(),
        };

        let old = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.clone(), entry);

        if let Some(old) = old {
            debug!("{}: replacing existing poll schedule", task.endpoint());
            old.active.store(false, Ordering::Release);
            old.handle.abort();
        }
        info!(
            "{}: registered poll, period {:?}, initial delay {:?}",
            task.endpoint(),
            period,
            initial_delay
        );
    }

    fn spawn_poll_loop(
        &self,
        task: Task,
        period: Duration,
        initial_delay: Duration,
        active: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let executor = self.executor.clone();
        let permits = self.dispatch_permits.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticks = tokio::time::interval_at(start, period);
            // Default burst behaviour: overruns catch up, ticks never pile
            // onto each other because this loop is the only consumer
            loop {
                ticks.tick().await;
                if !active.load(Ordering::Acquire) {
                    return;
                }
                let Ok(_permit) = permits.acquire().await else {
                    return;
                };
                executor.run(&task, Some(&active)).await;
            }
        })
    }

    /// Remove a poll. Returns `false` when the task was not registered.
    ///
    /// The endpoint's pooled connections are marked for disconnect-on-return
    /// and idle ones are closed, so an unregistered device's link does not
    /// linger.
    pub async fn unregister_regular_poll(&self, task: &Task) -> bool {
        let removed = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task);

        let Some(entry) = removed else {
            return false;
        };

        entry.active.store(false, Ordering::Release);
        entry.handle.abort();

        self.pool.disconnect_on_return(task.endpoint(), Instant::now());
        self.pool.clear(task.endpoint()).await;

        info!("{}: unregistered poll", task.endpoint());
        true
    }

    /// Tasks with an installed schedule.
    pub fn registered_polls(&self) -> Vec<Task> {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Registry details, including registration timestamps.
    pub fn poll_details(&self) -> Vec<RegisteredPoll> {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(task, entry)| RegisteredPoll {
                task: task.clone(),
                period: entry.period,
                initial_delay: entry.initial_delay,
                registered_at: entry.registered_at,
            })
            .collect()
    }

    /// Cancel every poll (used by manager deactivation).
    pub async fn unregister_all(&self) {
        let entries: Vec<(Task, PollEntry)> = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();

        for (task, entry) in entries {
            entry.active.store(false, Ordering::Release);
            entry.handle.abort();
            self.pool.disconnect_on_return(task.endpoint(), Instant::now());
            self.pool.clear(task.endpoint()).await;
        }
    }
}
