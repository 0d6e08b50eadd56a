//! Transaction execution with retry and reconnect
//!
//! One [`Executor::run`] call drives a task to its terminal state: a single
//! success callback, a single error callback carrying the last error of the
//! retry sequence, or a silent abort when the task was unregistered
//! mid-flight. Each attempt walks borrow → exchange → decode → release, and
//! every path releases the connection exactly once.
//!
//! Per-error retry policy:
//!
//! | Failure | Connection |
//! |---------|------------|
//! | slave exception PDU | kept, paced, retried |
//! | I/O error or timeout | invalidated, re-borrowed |
//! | transaction ID mismatch | invalidated, re-borrowed |
//! | decode error | invalidated, re-borrowed |
//! | anything else | invalidated, re-borrowed |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::error::{ModbusResult, RetryAction};
use crate::pool::{BorrowedConnection, ConnectionPool};
use crate::request::ReadPayload;
use crate::task::{Task, TaskRequest};

/// Runs tasks against the pool and dispatches their callbacks.
pub(crate) struct Executor {
    pool: Arc<ConnectionPool>,
    callback_permits: Arc<Semaphore>,
}

/// Outcome of one wire exchange.
enum AttemptOutcome {
    Read(ReadPayload),
    Write(crate::request::WriteSummary),
}

impl Executor {
    pub fn new(pool: Arc<ConnectionPool>, callback_permits: Arc<Semaphore>) -> Self {
        Self {
            pool,
            callback_permits,
        }
    }

    /// Execute `task` to completion.
    ///
    /// `registered` is the poll's active flag; `None` for one-off tasks.
    /// When the flag drops mid-flight the run aborts without any callback.
    pub async fn run(&self, task: &Task, registered: Option<&Arc<AtomicBool>>) {
        let max_tries = task.request().max_tries();
        let config = self.pool.config_for(task.endpoint());

        let mut held: Option<BorrowedConnection> = None;
        let mut last_error = None;

        for attempt in 1..=max_tries {
            if let Some(flag) = registered {
                if !flag.load(Ordering::Acquire) {
                    debug!("{}: unregistered mid-flight, aborting", task.endpoint());
                    if let Some(connection) = held.take() {
                        connection.give_back().await;
                    }
                    return;
                }
            }

            let attempt_started = Instant::now();

            let mut connection = match held.take() {
                Some(connection) => connection,
                None => match self.pool.borrow(task.endpoint()).await {
                    Ok(connection) => connection,
                    Err(e) => {
                        // Connect failure ends the task; the pool already
                        // spent its connect-retry budget
                        warn!("{}: borrow failed: {e}", task.endpoint());
                        self.dispatch_error(task, e).await;
                        return;
                    }
                },
            };

            let result = self.exchange(task, &mut connection).await;

            match result {
                Ok(outcome) => {
                    connection.give_back().await;
                    self.dispatch_success(task, outcome).await;
                    return;
                }
                Err(e) => {
                    trace!(
                        "{}: attempt {attempt}/{max_tries} failed: {e}",
                        task.endpoint()
                    );
                    match e.retry_action() {
                        RetryAction::Keep if attempt < max_tries => {
                            // Pace on the same connection before retrying
                            let delay = config.inter_transaction_delay();
                            let elapsed = attempt_started.elapsed();
                            if elapsed < delay {
                                tokio::time::sleep(delay - elapsed).await;
                            }
                            held = Some(connection);
                        }
                        RetryAction::Keep => {
                            connection.give_back().await;
                        }
                        RetryAction::Invalidate => {
                            connection.invalidate().await;
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        // max_tries >= 1, so the loop ran and recorded an error
        let Some(error) = last_error else {
            return;
        };
        debug!(
            "{}: all {max_tries} attempt(s) failed: {error}",
            task.endpoint()
        );
        self.dispatch_error(task, error).await;
    }

    /// One request/response exchange on an already-borrowed connection.
    async fn exchange(
        &self,
        task: &Task,
        connection: &mut BorrowedConnection,
    ) -> ModbusResult<AttemptOutcome> {
        match task.request() {
            TaskRequest::Read(request) => {
                let pdu = request.to_pdu()?;
                let response = connection.transport().execute(request.unit_id(), &pdu).await?;
                Ok(AttemptOutcome::Read(request.decode_response(&response)?))
            }
            TaskRequest::Write(request) => {
                let pdu = request.to_pdu()?;
                let response = connection.transport().execute(request.unit_id(), &pdu).await?;
                Ok(AttemptOutcome::Write(request.verify_response(&response)?))
            }
        }
    }

    /// Deliver a success on the callback pool; awaits delivery so a poll's
    /// k-th callback lands before its (k+1)-th tick is scheduled.
    async fn dispatch_success(&self, task: &Task, outcome: AttemptOutcome) {
        let Some(callback) = task.callback() else {
            trace!("{}: callback gone, dropping result", task.endpoint());
            return;
        };
        let request = task.request().clone();
        let permits = self.callback_permits.clone();

        let delivery = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("callback pool shut down, dropping result");
                return;
            };
            match (&request, outcome) {
                (TaskRequest::Read(read), AttemptOutcome::Read(payload)) => {
                    callback.on_read(read, payload)
                }
                (TaskRequest::Write(write), AttemptOutcome::Write(summary)) => {
                    callback.on_write(write, summary)
                }
                _ => unreachable!("outcome shape always matches the request"),
            }
        });
        delivery.await.ok();
    }

    /// Deliver the terminal error on the callback pool.
    async fn dispatch_error(&self, task: &Task, error: crate::error::ModbusError) {
        let Some(callback) = task.callback() else {
            trace!("{}: callback gone, dropping error", task.endpoint());
            return;
        };
        let request = task.request().clone();
        let permits = self.callback_permits.clone();

        let delivery = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("callback pool shut down, dropping error report");
                return;
            };
            callback.on_error(&request, &error);
        });
        delivery.await.ok();
    }
}
