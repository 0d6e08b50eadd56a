//! Manager facade
//!
//! The single externally addressable entity. It owns the connection pool and
//! the scheduler, carries the endpoint configuration map across activations,
//! and broadcasts configuration changes to listeners.
//!
//! Lifecycle: a fresh manager is inactive. [`activate`](ModbusManager::activate)
//! constructs the pool and scheduler; [`deactivate`](ModbusManager::deactivate)
//! unregisters every poll and closes the pool but keeps the shared worker
//! pools, so the manager can be activated again.
//! [`shutdown`](ModbusManager::shutdown) closes the worker pools for good;
//! activation is refused afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::endpoint::{EndpointKey, EndpointPoolConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::executor::Executor;
use crate::pool::ConnectionPool;
use crate::scheduler::{
    CancelHandle, RegisteredPoll, Scheduler, DEFAULT_CALLBACK_WORKERS, DEFAULT_DISPATCH_WORKERS,
};
use crate::task::{Task, TaskRequest};
use crate::transport::{NetTransportFactory, TransportFactory};

/// Observer of manager-wide events.
pub trait ManagerListener: Send + Sync {
    /// A pool configuration was stored for `key`. Invoked synchronously,
    /// after the new configuration has taken effect.
    fn on_endpoint_pool_configuration_set(&self, key: &EndpointKey, config: &EndpointPoolConfig);
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Dispatch workers executing transactions.
    pub dispatch_workers: usize,
    /// Callback workers delivering results.
    pub callback_workers: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            callback_workers: DEFAULT_CALLBACK_WORKERS,
        }
    }
}

#[derive(Clone)]
struct Inner {
    pool: Arc<ConnectionPool>,
    scheduler: Arc<Scheduler>,
}

/// Pools and schedules Modbus transactions for many logical consumers
/// sharing few physical links.
pub struct ModbusManager {
    factory: Arc<dyn TransportFactory>,
    dispatch_permits: Arc<Semaphore>,
    callback_permits: Arc<Semaphore>,
    configs: Mutex<HashMap<EndpointKey, EndpointPoolConfig>>,
    listeners: Mutex<Vec<Arc<dyn ManagerListener>>>,
    inner: Mutex<Option<Inner>>,
}

impl ModbusManager {
    /// Manager over real TCP/UDP/serial transports with default pool sizes.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(NetTransportFactory), ManagerConfig::default())
    }

    /// Manager with an explicit transport factory and worker sizing.
    pub fn with_factory(factory: Arc<dyn TransportFactory>, config: ManagerConfig) -> Self {
        Self {
            factory,
            dispatch_permits: Arc::new(Semaphore::new(config.dispatch_workers.max(1))),
            callback_permits: Arc::new(Semaphore::new(config.callback_workers.max(1))),
            configs: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            inner: Mutex::new(None),
        }
    }

    /// Construct pool and scheduler if absent.
    ///
    /// Refused once the shared worker pools have been shut down.
    pub fn activate(&self) -> ModbusResult<()> {
        if self.dispatch_permits.is_closed() || self.callback_permits.is_closed() {
            return Err(ModbusError::inactive(
                "worker pools are shut down; manager cannot activate",
            ));
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.is_some() {
            debug!("manager already active");
            return Ok(());
        }

        let pool = Arc::new(ConnectionPool::new(self.factory.clone()));
        for (key, config) in self.configs.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            pool.set_config(key.clone(), *config);
        }

        let executor = Arc::new(Executor::new(pool.clone(), self.callback_permits.clone()));
        let scheduler = Arc::new(Scheduler::new(
            executor,
            pool.clone(),
            self.dispatch_permits.clone(),
        ));

        *inner = Some(Inner { pool, scheduler });
        info!("manager activated");
        Ok(())
    }

    /// Unregister every poll, close the pool, quiesce.
    ///
    /// The shared worker pools survive; [`activate`](Self::activate) may be
    /// called again afterwards.
    pub async fn deactivate(&self) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(inner) = inner {
            inner.scheduler.unregister_all().await;
            inner.pool.close().await;
            info!("manager deactivated");
        }
    }

    /// Destroy the shared worker pools. Irreversible; activation is refused
    /// from now on.
    pub async fn shutdown(&self) {
        self.deactivate().await;
        self.dispatch_permits.close();
        self.callback_permits.close();
        info!("manager shut down");
    }

    /// True while pool and scheduler exist.
    pub fn is_active(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn inner(&self) -> ModbusResult<Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ModbusError::inactive("manager is not activated"))
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Run a read task once, as soon as a worker frees up.
    pub fn submit_one_time_read(&self, task: Task) -> ModbusResult<CancelHandle> {
        if !matches!(task.request(), TaskRequest::Read(_)) {
            return Err(ModbusError::invalid_data(
                "submit_one_time_read requires a read task",
            ));
        }
        Ok(self.inner()?.scheduler.submit_one_time(task))
    }

    /// Run a write task once, as soon as a worker frees up.
    pub fn submit_one_time_write(&self, task: Task) -> ModbusResult<CancelHandle> {
        if !matches!(task.request(), TaskRequest::Write(_)) {
            return Err(ModbusError::invalid_data(
                "submit_one_time_write requires a write task",
            ));
        }
        Ok(self.inner()?.scheduler.submit_one_time(task))
    }

    /// Install a fixed-rate poll; a schedule already registered for the same
    /// task is cancelled first.
    pub fn register_regular_poll(
        &self,
        task: Task,
        period: Duration,
        initial_delay: Duration,
    ) -> ModbusResult<()> {
        if !matches!(task.request(), TaskRequest::Read(_)) {
            return Err(ModbusError::invalid_data(
                "periodic polls must be read tasks",
            ));
        }
        if period.is_zero() {
            return Err(ModbusError::invalid_data("poll period must be non-zero"));
        }
        self.inner()?
            .scheduler
            .register_regular_poll(task, period, initial_delay);
        Ok(())
    }

    /// Remove a poll. `Ok(false)` when the task was not registered.
    pub async fn unregister_regular_poll(&self, task: &Task) -> ModbusResult<bool> {
        Ok(self.inner()?.scheduler.unregister_regular_poll(task).await)
    }

    /// Tasks with an installed schedule.
    pub fn registered_polls(&self) -> Vec<Task> {
        self.inner()
            .map(|inner| inner.scheduler.registered_polls())
            .unwrap_or_default()
    }

    /// Registry details including registration timestamps.
    pub fn poll_details(&self) -> Vec<RegisteredPoll> {
        self.inner()
            .map(|inner| inner.scheduler.poll_details())
            .unwrap_or_default()
    }

    // ========================================================================
    // Endpoint configuration
    // ========================================================================

    /// Store a pool configuration for `key` and notify listeners.
    ///
    /// Existing pooled connections are preserved; the new pacing applies
    /// from the next borrow.
    pub fn set_endpoint_pool_configuration(&self, key: EndpointKey, config: EndpointPoolConfig) {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), config);

        if let Ok(inner) = self.inner() {
            inner.pool.set_config(key.clone(), config);
        }

        // Synchronous broadcast, after the configuration took effect
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener.on_endpoint_pool_configuration_set(&key, &config);
        }
    }

    /// Effective configuration for `key`: the stored one, or the transport
    /// default.
    pub fn get_endpoint_pool_configuration(&self, key: &EndpointKey) -> EndpointPoolConfig {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or_else(|| key.default_pool_config())
    }

    /// Register a listener for configuration changes.
    pub fn add_listener(&self, listener: Arc<dyn ManagerListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Remove a previously added listener (pointer identity).
    pub fn remove_listener(&self, listener: &Arc<dyn ManagerListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }
}

impl Default for ModbusManager {
    fn default() -> Self {
        Self::new()
    }
}
