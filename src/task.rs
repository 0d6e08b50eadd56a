//! Tasks and consumer callbacks
//!
//! A [`Task`] binds one request to one endpoint and one callback. Tasks
//! compare by endpoint, request content and callback identity; the poll
//! registry keys on that equality, so re-submitting the same triple replaces
//! the earlier registration.
//!
//! Callbacks are held weakly: a consumer torn down mid-poll stops receiving
//! results without keeping the manager graph alive, and a vanished callback
//! never blocks task execution.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::endpoint::EndpointKey;
use crate::error::ModbusError;
use crate::request::{ReadPayload, ReadRequest, WriteRequest, WriteSummary};

/// Consumer-side sink for transaction outcomes.
///
/// Invoked on the callback worker pool, never on the thread holding the
/// connection slot. A slow implementation delays its own task's next poll
/// but no one else's transactions.
pub trait ModbusCallback: Send + Sync {
    /// A read completed; the payload shape follows the function code.
    fn on_read(&self, request: &ReadRequest, payload: ReadPayload);

    /// A write was acknowledged.
    fn on_write(&self, request: &WriteRequest, summary: WriteSummary);

    /// All retries failed; `error` is the last error of the sequence.
    fn on_error(&self, request: &TaskRequest, error: &ModbusError);
}

/// The request half of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskRequest {
    Read(ReadRequest),
    Write(WriteRequest),
}

impl TaskRequest {
    /// Retry budget of the underlying request.
    pub fn max_tries(&self) -> u32 {
        match self {
            Self::Read(r) => r.max_tries(),
            Self::Write(w) => w.max_tries(),
        }
    }

    /// Unit (slave) ID the request addresses.
    pub fn unit_id(&self) -> u8 {
        match self {
            Self::Read(r) => r.unit_id(),
            Self::Write(w) => w.unit_id(),
        }
    }
}

impl fmt::Display for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(r) => write!(f, "{r}"),
            Self::Write(w) => write!(f, "{w}"),
        }
    }
}

/// One unit of schedulable work: endpoint + request + callback.
#[derive(Clone)]
pub struct Task {
    endpoint: EndpointKey,
    request: TaskRequest,
    callback: Weak<dyn ModbusCallback>,
}

impl Task {
    /// Read task.
    pub fn read(
        endpoint: EndpointKey,
        request: ReadRequest,
        callback: &Arc<dyn ModbusCallback>,
    ) -> Self {
        Self {
            endpoint,
            request: TaskRequest::Read(request),
            callback: Arc::downgrade(callback),
        }
    }

    /// Write task.
    pub fn write(
        endpoint: EndpointKey,
        request: WriteRequest,
        callback: &Arc<dyn ModbusCallback>,
    ) -> Self {
        Self {
            endpoint,
            request: TaskRequest::Write(request),
            callback: Arc::downgrade(callback),
        }
    }

    pub fn endpoint(&self) -> &EndpointKey {
        &self.endpoint
    }

    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    /// The live callback, if the consumer still holds it.
    pub fn callback(&self) -> Option<Arc<dyn ModbusCallback>> {
        self.callback.upgrade()
    }

    fn callback_ptr(&self) -> *const () {
        self.callback.as_ptr() as *const ()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
            && self.request == other.request
            && std::ptr::eq(self.callback_ptr(), other.callback_ptr())
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
        self.request.hash(state);
        (self.callback_ptr() as usize).hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("endpoint", &self.endpoint)
            .field("request", &self.request)
            .field("callback_alive", &(self.callback.strong_count() > 0))
            .finish()
    }
}
