//! End-to-end scenarios against an in-process Modbus TCP slave
//!
//! The mock slave speaks real MBAP over a loopback socket. Its behaviour is
//! scripted per request: answer with registers, reply with an exception PDU,
//! drop the connection mid-transaction, or mangle the transaction ID.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use relay_modbus::{
    EndpointKey, EndpointPoolConfig, ErrorKind, ManagerConfig, ModbusCallback, ModbusError,
    ModbusManager, NetTransportFactory, ReadFunction, ReadPayload, ReadRequest, Task, TaskRequest,
    Value, ValueType, WriteRequest, WriteSummary,
};

// ============================================================================
// Mock slave
// ============================================================================

#[derive(Debug, Clone)]
enum SlaveBehavior {
    /// Answer a read with these registers.
    Registers(Vec<u16>),
    /// Reply with an exception PDU carrying this code.
    Exception(u8),
    /// Close the connection without answering.
    DropConnection,
    /// Answer correctly but with a mangled transaction ID.
    WrongTransactionId,
    /// Acknowledge a write by echoing the request head.
    EchoWrite,
}

struct MockSlave {
    port: u16,
    requests_seen: Arc<AtomicUsize>,
    request_pdus: Arc<Mutex<Vec<Vec<u8>>>>,
    script: Arc<Mutex<VecDeque<SlaveBehavior>>>,
}

impl MockSlave {
    async fn start(default_behavior: SlaveBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let requests_seen = Arc::new(AtomicUsize::new(0));
        let request_pdus = Arc::new(Mutex::new(Vec::new()));
        let script: Arc<Mutex<VecDeque<SlaveBehavior>>> = Arc::new(Mutex::new(VecDeque::new()));

        let slave = Self {
            port,
            requests_seen: requests_seen.clone(),
            request_pdus: request_pdus.clone(),
            script: script.clone(),
        };

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let requests_seen = requests_seen.clone();
                let request_pdus = request_pdus.clone();
                let script = script.clone();
                let default_behavior = default_behavior.clone();

                tokio::spawn(async move {
                    loop {
                        let mut header = [0u8; 6];
                        if socket.read_exact(&mut header).await.is_err() {
                            return;
                        }
                        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
                        let mut body = vec![0u8; length];
                        if socket.read_exact(&mut body).await.is_err() {
                            return;
                        }

                        let transaction_id = u16::from_be_bytes([header[0], header[1]]);
                        let unit_id = body[0];
                        let pdu = body[1..].to_vec();

                        requests_seen.fetch_add(1, Ordering::SeqCst);
                        request_pdus.lock().unwrap().push(pdu.clone());

                        let behavior = script
                            .lock()
                            .unwrap()
                            .pop_front()
                            .unwrap_or_else(|| default_behavior.clone());

                        let (response_tid, response_pdu) = match behavior {
                            SlaveBehavior::Registers(values) => {
                                let mut out = vec![pdu[0], (values.len() * 2) as u8];
                                for value in values {
                                    out.extend_from_slice(&value.to_be_bytes());
                                }
                                (transaction_id, out)
                            }
                            SlaveBehavior::Exception(code) => {
                                (transaction_id, vec![pdu[0] | 0x80, code])
                            }
                            SlaveBehavior::DropConnection => return,
                            SlaveBehavior::WrongTransactionId => {
                                (transaction_id.wrapping_add(7), vec![pdu[0], 4, 0, 0, 0, 0])
                            }
                            SlaveBehavior::EchoWrite => {
                                (transaction_id, pdu[..5.min(pdu.len())].to_vec())
                            }
                        };

                        let mut frame = Vec::with_capacity(7 + response_pdu.len());
                        frame.extend_from_slice(&response_tid.to_be_bytes());
                        frame.extend_from_slice(&0u16.to_be_bytes());
                        frame.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
                        frame.push(unit_id);
                        frame.extend_from_slice(&response_pdu);
                        if socket.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        slave
    }

    fn endpoint(&self) -> EndpointKey {
        EndpointKey::tcp("127.0.0.1", self.port)
    }

    fn push(&self, behavior: SlaveBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    fn requests_seen(&self) -> usize {
        self.requests_seen.load(Ordering::SeqCst)
    }

    fn request_pdus(&self) -> Vec<Vec<u8>> {
        self.request_pdus.lock().unwrap().clone()
    }
}

// ============================================================================
// Callback recorder
// ============================================================================

#[derive(Default)]
struct Recorder {
    reads: Mutex<Vec<(ReadPayload, Instant)>>,
    writes: Mutex<Vec<WriteSummary>>,
    errors: Mutex<Vec<ErrorKind>>,
}

impl Recorder {
    fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().clone()
    }
}

impl ModbusCallback for Recorder {
    fn on_read(&self, _: &ReadRequest, payload: ReadPayload) {
        self.reads.lock().unwrap().push((payload, Instant::now()));
    }
    fn on_write(&self, _: &WriteRequest, summary: WriteSummary) {
        self.writes.lock().unwrap().push(summary);
    }
    fn on_error(&self, _: &TaskRequest, error: &ModbusError) {
        self.errors.lock().unwrap().push(error.kind());
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    manager: ModbusManager,
    slave: MockSlave,
    recorder: Arc<Recorder>,
    callback: Arc<dyn ModbusCallback>,
}

async fn harness(default_behavior: SlaveBehavior) -> Harness {
    let slave = MockSlave::start(default_behavior).await;

    let manager =
        ModbusManager::with_factory(Arc::new(NetTransportFactory), ManagerConfig::default());
    manager.set_endpoint_pool_configuration(
        slave.endpoint(),
        EndpointPoolConfig::tcp_default()
            .with_inter_transaction_delay_ms(1)
            .with_reconnect_after_ms(-1)
            .with_connect_timeout_ms(1000)
            .with_read_timeout_ms(1000),
    );
    manager.activate().unwrap();

    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn ModbusCallback> = recorder.clone();
    Harness {
        manager,
        slave,
        recorder,
        callback,
    }
}

fn holding_read(h: &Harness, reference: u16, length: u16, max_tries: u32) -> Task {
    Task::read(
        h.slave.endpoint(),
        ReadRequest::new(1, ReadFunction::HoldingRegisters, reference, length, max_tries).unwrap(),
        &h.callback,
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

// ============================================================================
// Scenarios
// ============================================================================

/// S1: TCP read, happy path.
#[tokio::test]
async fn s1_tcp_read_happy_path() {
    let h = harness(SlaveBehavior::Registers(vec![0x1234, 0x5678])).await;

    h.manager
        .submit_one_time_read(holding_read(&h, 100, 2, 3))
        .unwrap();
    settle().await;

    let reads = h.recorder.reads.lock().unwrap();
    match reads.as_slice() {
        [(ReadPayload::Registers(regs), _)] => {
            assert_eq!(regs.len(), 2);
            assert_eq!(
                regs.extract(0, ValueType::Int32).unwrap(),
                Value::I32(0x12345678)
            );
        }
        other => panic!("unexpected deliveries: {other:?}"),
    }
    assert!(h.recorder.error_kinds().is_empty());
}

/// S2: slave exception twice, then success; three attempts, no error.
#[tokio::test]
async fn s2_slave_exception_retries() {
    let h = harness(SlaveBehavior::Registers(vec![0x0001, 0x0002])).await;
    h.slave.push(SlaveBehavior::Exception(0x02));
    h.slave.push(SlaveBehavior::Exception(0x02));

    h.manager
        .submit_one_time_read(holding_read(&h, 100, 2, 3))
        .unwrap();
    settle().await;

    assert_eq!(h.slave.requests_seen(), 3);
    assert_eq!(h.recorder.read_count(), 1);
    assert!(h.recorder.error_kinds().is_empty());
}

/// S3: connection dropped mid-transaction; reconnect and succeed in 2 attempts.
#[tokio::test]
async fn s3_io_error_triggers_reconnect() {
    let h = harness(SlaveBehavior::Registers(vec![0x00AA, 0x00BB])).await;
    h.slave.push(SlaveBehavior::DropConnection);

    h.manager
        .submit_one_time_read(holding_read(&h, 0, 2, 3))
        .unwrap();
    settle().await;

    assert_eq!(h.slave.requests_seen(), 2);
    assert_eq!(h.recorder.read_count(), 1);
    assert!(h.recorder.error_kinds().is_empty());
}

/// S4: transaction ID mismatch on every attempt; terminal mismatch error.
#[tokio::test]
async fn s4_transaction_id_mismatch() {
    let h = harness(SlaveBehavior::WrongTransactionId).await;

    h.manager
        .submit_one_time_read(holding_read(&h, 0, 2, 2))
        .unwrap();
    settle().await;

    assert_eq!(h.slave.requests_seen(), 2);
    assert_eq!(
        h.recorder.error_kinds(),
        vec![ErrorKind::TransactionIdMismatch]
    );
    assert_eq!(h.recorder.read_count(), 0);
}

/// S5: periodic poll cadence.
#[tokio::test]
async fn s5_periodic_poll_cadence() {
    let h = harness(SlaveBehavior::Registers(vec![1, 2])).await;
    let task = holding_read(&h, 0, 2, 1);

    h.manager
        .register_regular_poll(task.clone(), Duration::from_millis(200), Duration::ZERO)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.manager.unregister_regular_poll(&task).await.unwrap();

    let reads = h.recorder.reads.lock().unwrap();
    let count = reads.len();
    assert!(
        (4..=8).contains(&count),
        "expected ~5-6 callbacks over 1.1 s, got {count}"
    );

    // Inter-arrival stays near the period (generous jitter for CI)
    for pair in reads.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(
            gap >= Duration::from_millis(120) && gap <= Duration::from_millis(450),
            "inter-arrival {gap:?} outside tolerance"
        );
    }
}

/// S6: single coil write emits FC05 with 0xFF00 and acknowledges.
#[tokio::test]
async fn s6_write_coil_single() {
    let h = harness(SlaveBehavior::EchoWrite).await;

    let task = Task::write(
        h.slave.endpoint(),
        WriteRequest::coil(1, 10, true, false, 1).unwrap(),
        &h.callback,
    );
    h.manager.submit_one_time_write(task).unwrap();
    settle().await;

    let pdus = h.slave.request_pdus();
    assert_eq!(pdus.len(), 1);
    assert_eq!(pdus[0], vec![0x05, 0x00, 0x0A, 0xFF, 0x00]);

    let writes = h.recorder.writes.lock().unwrap();
    assert_eq!(writes.as_slice(), &[WriteSummary { function_code: 0x05 }]);
    assert!(h.recorder.error_kinds().is_empty());
}

// ============================================================================
// Cross-cutting properties
// ============================================================================

/// A failing task with maxTries=N produces exactly N wire attempts and one
/// terminal error.
#[tokio::test]
async fn retry_budget_is_exact() {
    let h = harness(SlaveBehavior::Exception(0x06)).await;

    h.manager
        .submit_one_time_read(holding_read(&h, 0, 1, 4))
        .unwrap();
    settle().await;

    assert_eq!(h.slave.requests_seen(), 4);
    assert_eq!(
        h.recorder.error_kinds(),
        vec![ErrorKind::SlaveException {
            function: 3,
            code: 0x06
        }]
    );
}

/// After unregistering, at most one further callback may arrive.
#[tokio::test]
async fn unregister_cancels_promptly() {
    let h = harness(SlaveBehavior::Registers(vec![9])).await;
    let task = holding_read(&h, 0, 1, 1);

    h.manager
        .register_regular_poll(task.clone(), Duration::from_millis(50), Duration::ZERO)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(h.manager.unregister_regular_poll(&task).await.unwrap());
    let at_unregister = h.recorder.read_count();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = h.recorder.read_count();
    assert!(
        after <= at_unregister + 1,
        "poll kept delivering after unregister: {at_unregister} -> {after}"
    );
}

/// Registering the same task twice leaves exactly one active schedule.
#[tokio::test]
async fn reregistration_replaces_schedule() {
    let h = harness(SlaveBehavior::Registers(vec![3])).await;
    let task = holding_read(&h, 0, 1, 1);

    h.manager
        .register_regular_poll(task.clone(), Duration::from_millis(100), Duration::ZERO)
        .unwrap();
    h.manager
        .register_regular_poll(task.clone(), Duration::from_millis(100), Duration::ZERO)
        .unwrap();

    assert_eq!(h.manager.registered_polls().len(), 1);

    tokio::time::sleep(Duration::from_millis(450)).await;
    h.manager.unregister_regular_poll(&task).await.unwrap();

    // One schedule's cadence, not a doubled one
    let count = h.recorder.read_count();
    assert!(count <= 7, "doubled schedule detected: {count} callbacks");
}

/// Pacing: consecutive transactions on one endpoint respect the configured
/// inter-transaction delay.
#[tokio::test]
async fn pacing_between_transactions() {
    let h = harness(SlaveBehavior::Registers(vec![1])).await;
    h.manager.set_endpoint_pool_configuration(
        h.slave.endpoint(),
        EndpointPoolConfig::tcp_default()
            .with_inter_transaction_delay_ms(80)
            .with_reconnect_after_ms(-1),
    );

    let started = Instant::now();
    h.manager
        .submit_one_time_read(holding_read(&h, 0, 1, 1))
        .unwrap();
    h.manager
        .submit_one_time_read(holding_read(&h, 0, 1, 1))
        .unwrap();

    while h.recorder.read_count() < 2 && started.elapsed() < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let reads = h.recorder.reads.lock().unwrap();
    assert_eq!(reads.len(), 2);
    let gap = reads[1].1.duration_since(reads[0].1);
    assert!(
        gap >= Duration::from_millis(60),
        "transactions paced only {gap:?} apart"
    );
}

/// Deactivation stops polls and survives re-activation.
#[tokio::test]
async fn deactivate_then_reactivate() {
    let h = harness(SlaveBehavior::Registers(vec![5])).await;
    let task = holding_read(&h, 0, 1, 1);

    h.manager
        .register_regular_poll(task, Duration::from_millis(50), Duration::ZERO)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    h.manager.deactivate().await;
    let at_deactivation = h.recorder.read_count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.recorder.read_count() <= at_deactivation + 1);

    h.manager.activate().unwrap();
    h.manager
        .submit_one_time_read(holding_read(&h, 0, 1, 1))
        .unwrap();
    settle().await;
    assert!(h.recorder.read_count() > at_deactivation);
}
