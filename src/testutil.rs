//! Scripted transports for unit tests
//!
//! A [`ScriptedTransport`] pops pre-queued responses instead of touching a
//! socket; a [`ScriptedFactory`] hands them to the pool and counts connect
//! attempts. Reconnections share the response queue, so a retry scenario is
//! scripted once regardless of how many connections it spans.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::endpoint::{EndpointKey, EndpointPoolConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::Pdu;
use crate::transport::{ModbusTransport, TransportFactory};

type ResponseQueue = Arc<Mutex<VecDeque<ModbusResult<Pdu>>>>;

/// Transport that replays a scripted response queue.
pub(crate) struct ScriptedTransport {
    responses: ResponseQueue,
}

impl ScriptedTransport {
    /// No scripted responses; `execute` fails if ever called.
    pub fn empty() -> Self {
        Self::sharing(Arc::new(Mutex::new(VecDeque::new())))
    }

    /// Own scripted responses, consumed in order.
    pub fn with_script(script: Vec<ModbusResult<Pdu>>) -> Self {
        Self::sharing(Arc::new(Mutex::new(script.into_iter().collect())))
    }

    /// Share a response queue with other transports (reconnect scenarios).
    pub fn sharing(responses: ResponseQueue) -> Self {
        Self { responses }
    }
}

#[async_trait]
impl ModbusTransport for ScriptedTransport {
    async fn execute(&mut self, _unit_id: u8, _request: &Pdu) -> ModbusResult<Pdu> {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(ModbusError::unknown("no scripted response left")))
    }

    async fn close(&mut self) -> ModbusResult<()> {
        Ok(())
    }
}

/// Shared monotonically increasing counter.
#[derive(Clone)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

type TransportMaker = Box<dyn Fn() -> ScriptedTransport + Send + Sync>;

/// Factory handing scripted transports to the pool.
pub(crate) struct ScriptedFactory {
    maker: Option<TransportMaker>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    /// Every connect succeeds with a transport from `maker`.
    pub fn always(maker: impl Fn() -> ScriptedTransport + Send + Sync + 'static) -> Self {
        Self {
            maker: Some(Box::new(maker)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every connect fails.
    pub fn failing() -> Self {
        Self {
            maker: None,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of connect attempts.
    pub fn connect_counter(&self) -> Counter {
        Counter(self.connects.clone())
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn connect(
        &self,
        key: &EndpointKey,
        _config: &EndpointPoolConfig,
    ) -> ModbusResult<Box<dyn ModbusTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.maker {
            Some(maker) => Ok(Box::new(maker())),
            None => Err(ModbusError::connection(format!("{key}: scripted refusal"))),
        }
    }
}

// ============================================================================
// Response helpers
// ============================================================================

/// FC03/FC04 response PDU carrying the given registers.
pub(crate) fn register_response(fc: u8, values: &[u16]) -> Pdu {
    let mut pdu = Pdu::new();
    pdu.push(fc).unwrap();
    pdu.push((values.len() * 2) as u8).unwrap();
    for &value in values {
        pdu.push_u16(value).unwrap();
    }
    pdu
}

/// FC01/FC02 response PDU carrying the given bits (LSB-first packing).
pub(crate) fn bit_response(fc: u8, bits: &[bool]) -> Pdu {
    let mut pdu = Pdu::new();
    pdu.push(fc).unwrap();
    pdu.push(bits.len().div_ceil(8) as u8).unwrap();
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 1 << i;
            }
        }
        pdu.push(byte).unwrap();
    }
    pdu
}

/// Exception response PDU for the given function and exception code.
pub(crate) fn exception_response(fc: u8, code: u8) -> Pdu {
    let mut pdu = Pdu::new();
    pdu.push(fc | 0x80).unwrap();
    pdu.push(code).unwrap();
    pdu
}

/// Write acknowledgement PDU echoing the request's head.
pub(crate) fn write_ack(fc: u8, reference: u16, value: u16) -> Pdu {
    let mut pdu = Pdu::new();
    pdu.push(fc).unwrap();
    pdu.push_u16(reference).unwrap();
    pdu.push_u16(value).unwrap();
    pdu
}
