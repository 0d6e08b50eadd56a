//! Network and serial transports
//!
//! One [`ModbusTransport`] owns one live link and drives exactly one
//! request/response exchange at a time; serialisation across users of the
//! same endpoint is the pool's job, not the transport's. Each transport
//! couples a socket or serial port with the [`FrameCodec`] for its wire
//! encoding and the endpoint's read timeout.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

use crate::constants::{FRAME_BUFFER_SIZE, MBAP_HEADER_LEN};
use crate::endpoint::{EndpointKey, EndpointPoolConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{mbap_frame_len, FrameCodec, Framing};
use crate::pdu::Pdu;

#[cfg(feature = "serial")]
use crate::endpoint::{DataBits, Parity, SerialEncoding, SerialParams, StopBits};
#[cfg(feature = "serial")]
use crate::frame::rtu_frame_len;
#[cfg(feature = "serial")]
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// One live Modbus link.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Drive one request/response exchange: frame, send, receive, unframe.
    async fn execute(&mut self, unit_id: u8, request: &Pdu) -> ModbusResult<Pdu>;

    /// Close the link. Errors are advisory; the link is unusable afterwards.
    async fn close(&mut self) -> ModbusResult<()>;
}

/// Creates transports for endpoint keys. The pool holds one factory; tests
/// substitute scripted implementations.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        key: &EndpointKey,
        config: &EndpointPoolConfig,
    ) -> ModbusResult<Box<dyn ModbusTransport>>;
}

/// Default factory dialing real sockets and serial ports.
#[derive(Debug, Default)]
pub struct NetTransportFactory;

#[async_trait]
impl TransportFactory for NetTransportFactory {
    async fn connect(
        &self,
        key: &EndpointKey,
        config: &EndpointPoolConfig,
    ) -> ModbusResult<Box<dyn ModbusTransport>> {
        match key {
            EndpointKey::Tcp { host, port } => {
                let transport =
                    TcpTransport::connect(host, *port, config.connect_timeout(), config.read_timeout())
                        .await?;
                Ok(Box::new(transport))
            }
            EndpointKey::Udp { host, port } => {
                let transport = UdpTransport::connect(host, *port, config.read_timeout()).await?;
                Ok(Box::new(transport))
            }
            #[cfg(feature = "serial")]
            EndpointKey::Serial(params) => {
                let transport = SerialTransport::open(params, config.read_timeout())?;
                Ok(Box::new(transport))
            }
            #[cfg(not(feature = "serial"))]
            EndpointKey::Serial(_) => Err(ModbusError::configuration(
                "serial endpoints require the `serial` feature",
            )),
        }
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Modbus TCP transport: MBAP framing over a stream socket.
pub struct TcpTransport {
    stream: TcpStream,
    codec: FrameCodec,
    read_timeout: Duration,
}

impl TcpTransport {
    /// Connect within `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> ModbusResult<Self> {
        let address = resolve(host, port)?;
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ModbusError::timeout(
                    format!("connect to {address}"),
                    connect_timeout.as_millis() as u64,
                )
            })?
            .map_err(|e| ModbusError::connection(format!("connect to {address}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ModbusError::connection(format!("set_nodelay: {e}")))?;

        debug!("TCP connected to {address}");
        Ok(Self {
            stream,
            codec: FrameCodec::new(Framing::Mbap),
            read_timeout,
        })
    }

    async fn read_frame(&mut self) -> ModbusResult<Vec<u8>> {
        let mut header = [0u8; MBAP_HEADER_LEN];
        self.stream.read_exact(&mut header).await.map_err(eof_as_io)?;

        let total = mbap_frame_len(&header)?;
        let mut frame = vec![0u8; total];
        frame[..MBAP_HEADER_LEN].copy_from_slice(&header);
        self.stream
            .read_exact(&mut frame[MBAP_HEADER_LEN..])
            .await
            .map_err(eof_as_io)?;
        Ok(frame)
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn execute(&mut self, unit_id: u8, request: &Pdu) -> ModbusResult<Pdu> {
        let frame = self.codec.encode(unit_id, request);
        self.stream.write_all(&frame.bytes).await?;
        self.stream.flush().await?;

        let response = tokio::time::timeout(self.read_timeout, self.read_frame())
            .await
            .map_err(|_| {
                ModbusError::timeout("TCP response read", self.read_timeout.as_millis() as u64)
            })??;

        let (_, pdu) = self.codec.decode(&response, frame.transaction_id)?;
        Ok(pdu)
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.stream.shutdown().await.ok();
        Ok(())
    }
}

// ============================================================================
// UDP
// ============================================================================

/// Modbus UDP transport: MBAP framing, one datagram per direction.
pub struct UdpTransport {
    socket: UdpSocket,
    codec: FrameCodec,
    read_timeout: Duration,
}

impl UdpTransport {
    pub async fn connect(host: &str, port: u16, read_timeout: Duration) -> ModbusResult<Self> {
        let address = resolve(host, port)?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| ModbusError::connection(format!("bind UDP socket: {e}")))?;
        socket
            .connect(address)
            .await
            .map_err(|e| ModbusError::connection(format!("connect UDP to {address}: {e}")))?;

        debug!("UDP bound for {address}");
        Ok(Self {
            socket,
            codec: FrameCodec::new(Framing::Mbap),
            read_timeout,
        })
    }
}

#[async_trait]
impl ModbusTransport for UdpTransport {
    async fn execute(&mut self, unit_id: u8, request: &Pdu) -> ModbusResult<Pdu> {
        let frame = self.codec.encode(unit_id, request);
        self.socket.send(&frame.bytes).await?;

        let mut buffer = [0u8; FRAME_BUFFER_SIZE];
        let received = tokio::time::timeout(self.read_timeout, self.socket.recv(&mut buffer))
            .await
            .map_err(|_| {
                ModbusError::timeout("UDP response read", self.read_timeout.as_millis() as u64)
            })??;

        let (_, pdu) = self.codec.decode(&buffer[..received], frame.transaction_id)?;
        Ok(pdu)
    }

    async fn close(&mut self) -> ModbusResult<()> {
        Ok(())
    }
}

// ============================================================================
// Serial (RTU / ASCII)
// ============================================================================

/// Serial transport: RTU or ASCII framing over a serial line.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port: SerialStream,
    codec: FrameCodec,
    read_timeout: Duration,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    pub fn open(params: &SerialParams, read_timeout: Duration) -> ModbusResult<Self> {
        let builder = tokio_serial::new(&params.device, params.baud_rate)
            .data_bits(match params.data_bits {
                DataBits::Five => tokio_serial::DataBits::Five,
                DataBits::Six => tokio_serial::DataBits::Six,
                DataBits::Seven => tokio_serial::DataBits::Seven,
                DataBits::Eight => tokio_serial::DataBits::Eight,
            })
            .stop_bits(match params.stop_bits {
                StopBits::One => tokio_serial::StopBits::One,
                StopBits::Two => tokio_serial::StopBits::Two,
            })
            .parity(match params.parity {
                Parity::None => tokio_serial::Parity::None,
                Parity::Even => tokio_serial::Parity::Even,
                Parity::Odd => tokio_serial::Parity::Odd,
            });
        let port = builder
            .open_native_async()
            .map_err(|e| ModbusError::connection(format!("open {}: {e}", params.device)))?;

        let framing = match params.encoding {
            SerialEncoding::Rtu => Framing::Rtu,
            SerialEncoding::Ascii => Framing::Ascii,
        };
        debug!("serial port {} open ({framing:?})", params.device);
        Ok(Self {
            port,
            codec: FrameCodec::new(framing),
            read_timeout,
        })
    }

    async fn read_frame(&mut self) -> ModbusResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(FRAME_BUFFER_SIZE);
        let mut chunk = [0u8; FRAME_BUFFER_SIZE];

        loop {
            let n = self.port.read(&mut chunk).await.map_err(eof_as_io)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            frame.extend_from_slice(&chunk[..n]);

            match self.codec.framing() {
                Framing::Rtu => {
                    if let Some(total) = rtu_frame_len(&frame)? {
                        if frame.len() >= total {
                            frame.truncate(total);
                            return Ok(frame);
                        }
                    }
                }
                Framing::Ascii => {
                    if frame.ends_with(b"\r\n") {
                        return Ok(frame);
                    }
                }
                Framing::Mbap => unreachable!("serial transport never uses MBAP"),
            }
        }
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl ModbusTransport for SerialTransport {
    async fn execute(&mut self, unit_id: u8, request: &Pdu) -> ModbusResult<Pdu> {
        let frame = self.codec.encode(unit_id, request);
        self.port.write_all(&frame.bytes).await?;
        self.port.flush().await?;

        let response = tokio::time::timeout(self.read_timeout, self.read_frame())
            .await
            .map_err(|_| {
                ModbusError::timeout("serial response read", self.read_timeout.as_millis() as u64)
            })??;

        let (responding_unit, pdu) = self.codec.decode(&response, None)?;
        if responding_unit != unit_id {
            return Err(ModbusError::decode(format!(
                "response from unit {responding_unit}, expected {unit_id}"
            )));
        }
        Ok(pdu)
    }

    async fn close(&mut self) -> ModbusResult<()> {
        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> ModbusResult<SocketAddr> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ModbusError::configuration(format!("resolve {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| ModbusError::configuration(format!("no address for {host}:{port}")))
}

/// `read_exact` reports truncation as `UnexpectedEof`; keep it an I/O error
/// so the retry policy invalidates the connection.
fn eof_as_io(e: io::Error) -> ModbusError {
    ModbusError::Io(e)
}
