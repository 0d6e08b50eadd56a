//! Keyed connection pool with per-endpoint serialisation
//!
//! One slot per [`EndpointKey`], at most one live connection per slot, at
//! most one borrower at a time. Waiters queue FIFO on the slot's
//! `tokio::sync::Mutex`, which grants the lock in request order, so a hot
//! endpoint cannot starve long-waiting submitters.
//!
//! Pacing happens inside the slot lock: before a borrower receives the
//! connection, the pool waits until the configured inter-transaction delay
//! has elapsed since the previous return on the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::endpoint::{EndpointKey, EndpointPoolConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::transport::{ModbusTransport, TransportFactory};

/// Fixed pause between failed connect attempts within one borrow.
const CONNECT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// A live connection with its pool bookkeeping.
struct PooledConnection {
    transport: Box<dyn ModbusTransport>,
    established_at: Instant,
    last_borrowed_at: Instant,
}

/// Mutable slot state, guarded by the slot's FIFO mutex.
#[derive(Default)]
struct SlotState {
    connection: Option<PooledConnection>,
    last_returned_at: Option<Instant>,
}

/// One endpoint's slot. The watermark lives outside the async mutex so
/// `disconnect_on_return` never blocks behind an in-flight transaction.
struct Slot {
    state: Arc<AsyncMutex<SlotState>>,
    disconnect_watermark: StdMutex<Option<Instant>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Arc::new(AsyncMutex::new(SlotState::default())),
            disconnect_watermark: StdMutex::new(None),
        }
    }

    fn watermark(&self) -> Option<Instant> {
        *self.disconnect_watermark.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keyed pool of Modbus connections, one per endpoint.
pub struct ConnectionPool {
    factory: Arc<dyn TransportFactory>,
    slots: StdMutex<HashMap<EndpointKey, Arc<Slot>>>,
    configs: StdMutex<HashMap<EndpointKey, EndpointPoolConfig>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            slots: StdMutex::new(HashMap::new()),
            configs: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Effective configuration for a key: the stored one, or the
    /// per-transport default.
    pub fn config_for(&self, key: &EndpointKey) -> EndpointPoolConfig {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or_else(|| key.default_pool_config())
    }

    /// Store a configuration. Existing connections are untouched; the new
    /// pacing applies from the next borrow.
    pub fn set_config(&self, key: EndpointKey, config: EndpointPoolConfig) {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, config);
    }

    /// Stored configuration, if any was set explicitly.
    pub fn stored_config(&self, key: &EndpointKey) -> Option<EndpointPoolConfig> {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn slot(&self, key: &EndpointKey) -> Arc<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    /// Borrow the key's connection, creating one if needed.
    ///
    /// Blocks (FIFO) until the previous borrower is done, then waits out the
    /// inter-transaction delay. Connection creation makes up to
    /// `connect_max_tries` attempts, each bounded by the connect timeout.
    pub async fn borrow(&self, key: &EndpointKey) -> ModbusResult<BorrowedConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ModbusError::inactive("pool is closed"));
        }

        let config = self.config_for(key);
        let slot = self.slot(key);
        let mut guard = slot.state.clone().lock_owned().await;

        // Pool may have been closed while we waited in the queue
        if self.closed.load(Ordering::Acquire) {
            return Err(ModbusError::inactive("pool is closed"));
        }

        // Inter-transaction pacing against the previous return
        if let Some(returned_at) = guard.last_returned_at {
            let delay = config.inter_transaction_delay();
            let since = returned_at.elapsed();
            if since < delay {
                tokio::time::sleep(delay - since).await;
            }
        }

        // A connection borrowed before the watermark must not be reused
        let pre_watermark = match (slot.watermark(), guard.connection.as_ref()) {
            (Some(watermark), Some(connection)) => connection.last_borrowed_at < watermark,
            _ => false,
        };
        if pre_watermark {
            debug!("{key}: dropping pre-watermark connection before borrow");
            if let Some(mut stale) = guard.connection.take() {
                stale.transport.close().await.ok();
            }
        }

        if guard.connection.is_none() {
            guard.connection = Some(self.create_connection(key, &config).await?);
        }

        if let Some(connection) = guard.connection.as_mut() {
            connection.last_borrowed_at = Instant::now();
        }

        Ok(BorrowedConnection {
            key: key.clone(),
            config,
            slot,
            guard,
            completed: false,
        })
    }

    async fn create_connection(
        &self,
        key: &EndpointKey,
        config: &EndpointPoolConfig,
    ) -> ModbusResult<PooledConnection> {
        let tries = config.connect_max_tries.max(1);
        let mut last_error = None;

        for attempt in 1..=tries {
            match tokio::time::timeout(config.connect_timeout(), self.factory.connect(key, config))
                .await
            {
                Ok(Ok(transport)) => {
                    debug!("{key}: connected (attempt {attempt}/{tries})");
                    if config.after_connect_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(config.after_connect_delay_ms))
                            .await;
                    }
                    let now = Instant::now();
                    return Ok(PooledConnection {
                        transport,
                        established_at: now,
                        last_borrowed_at: now,
                    });
                }
                Ok(Err(e)) => {
                    warn!("{key}: connect attempt {attempt}/{tries} failed: {e}");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("{key}: connect attempt {attempt}/{tries} timed out");
                    last_error = Some(ModbusError::timeout(
                        format!("connect to {key}"),
                        config.connect_timeout_ms,
                    ));
                }
            }

            if attempt < tries {
                tokio::time::sleep(CONNECT_RETRY_BACKOFF).await;
            }
        }

        Err(ModbusError::connection(format!(
            "{key}: giving up after {tries} attempt(s): {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Mark connections borrowed before `watermark` so they are closed
    /// instead of reused. Does not touch the in-flight transaction.
    pub fn disconnect_on_return(&self, key: &EndpointKey, watermark: Instant) {
        let slot = self.slot(key);
        let mut current = slot
            .disconnect_watermark
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *current = Some(current.map_or(watermark, |w| w.max(watermark)));
    }

    /// Close the idle connection for a key, if any.
    ///
    /// A connection currently borrowed is not idle and is left to its
    /// borrower; the disconnect watermark takes care of it on return.
    pub async fn clear(&self, key: &EndpointKey) {
        let slot = self.slot(key);
        let Ok(mut guard) = slot.state.try_lock() else {
            return;
        };
        if let Some(mut connection) = guard.connection.take() {
            debug!("{key}: clearing idle connection");
            connection.transport.close().await.ok();
        }
        guard.last_returned_at = Some(Instant::now());
    }

    /// Close everything and refuse further borrows.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let slots: Vec<_> = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for slot in slots {
            let mut guard = slot.state.lock().await;
            if let Some(mut connection) = guard.connection.take() {
                connection.transport.close().await.ok();
            }
        }
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Exclusive hold on one endpoint's connection.
///
/// The borrower must finish with [`give_back`](Self::give_back) or
/// [`invalidate`](Self::invalidate); if the guard is dropped instead (task
/// aborted mid-transaction) the connection is discarded, since its stream
/// may carry a half-read response.
pub struct BorrowedConnection {
    key: EndpointKey,
    config: EndpointPoolConfig,
    slot: Arc<Slot>,
    guard: OwnedMutexGuard<SlotState>,
    completed: bool,
}

impl std::fmt::Debug for BorrowedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BorrowedConnection")
            .field("key", &self.key)
            .field("completed", &self.completed)
            .finish()
    }
}

impl BorrowedConnection {
    /// The borrowed transport.
    pub fn transport(&mut self) -> &mut Box<dyn ModbusTransport> {
        &mut self
            .guard
            .connection
            .as_mut()
            .expect("borrowed slot always holds a connection")
            .transport
    }

    /// Key this connection belongs to.
    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    /// Return the connection for reuse.
    ///
    /// The connection is closed instead of kept when it was borrowed before
    /// a disconnect watermark, or when it is older than the endpoint's
    /// reconnect-after age.
    pub async fn give_back(mut self) {
        self.completed = true;
        let now = Instant::now();

        if let Some(mut connection) = self.guard.connection.take() {
            let close_reason = if self
                .slot
                .watermark()
                .is_some_and(|w| connection.last_borrowed_at < w)
            {
                Some("pre-watermark")
            } else if self
                .config
                .expires_at_age(now.duration_since(connection.established_at))
            {
                Some("aged out")
            } else {
                None
            };

            match close_reason {
                Some(reason) => {
                    debug!("{}: closing connection on return ({reason})", self.key);
                    connection.transport.close().await.ok();
                }
                None => self.guard.connection = Some(connection),
            }
        }
        self.guard.last_returned_at = Some(now);
    }

    /// Close the connection and remove it from the pool.
    pub async fn invalidate(mut self) {
        self.completed = true;
        if let Some(mut connection) = self.guard.connection.take() {
            debug!("{}: invalidating connection", self.key);
            connection.transport.close().await.ok();
        }
        self.guard.last_returned_at = Some(Instant::now());
    }
}

impl Drop for BorrowedConnection {
    fn drop(&mut self) {
        if !self.completed {
            // Aborted mid-transaction: the stream state is unknown
            self.guard.connection = None;
            self.guard.last_returned_at = Some(Instant::now());
        }
    }
}
