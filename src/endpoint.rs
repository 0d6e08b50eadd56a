//! Endpoint identity and per-endpoint pool tuning
//!
//! An [`EndpointKey`] canonically names one physical Modbus link. Keys
//! compare structurally: two tasks whose keys are equal serialise through
//! the same connection slot in the pool.

use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_MAX_TRIES, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_SERIAL_INTER_TRANSACTION_DELAY_MS, DEFAULT_TCP_INTER_TRANSACTION_DELAY_MS,
};

/// Serial line parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Serial data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Serial stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopBits {
    One,
    Two,
}

/// Serial wire encoding: binary RTU or 7-bit-safe ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerialEncoding {
    Rtu,
    Ascii,
}

/// Parameters of one serial Modbus link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialParams {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub encoding: SerialEncoding,
}

impl SerialParams {
    /// Common 8N1 RTU line at the given baud rate.
    pub fn rtu_8n1(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            encoding: SerialEncoding::Rtu,
        }
    }
}

/// Canonical identity of a physical Modbus link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointKey {
    Tcp { host: String, port: u16 },
    Udp { host: String, port: u16 },
    Serial(SerialParams),
}

impl EndpointKey {
    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// UDP endpoint.
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self::Udp {
            host: host.into(),
            port,
        }
    }

    /// Serial endpoint.
    pub fn serial(params: SerialParams) -> Self {
        Self::Serial(params)
    }

    /// True for serial links.
    pub fn is_serial(&self) -> bool {
        matches!(self, Self::Serial(_))
    }

    /// Pool configuration defaults for this transport.
    pub fn default_pool_config(&self) -> EndpointPoolConfig {
        if self.is_serial() {
            EndpointPoolConfig::serial_default()
        } else {
            EndpointPoolConfig::tcp_default()
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Udp { host, port } => write!(f, "udp://{host}:{port}"),
            Self::Serial(params) => write!(
                f,
                "serial://{}@{} ({:?})",
                params.device, params.baud_rate, params.encoding
            ),
        }
    }
}

/// Per-endpoint pool tuning.
///
/// `reconnect_after_ms = -1` keeps connections open indefinitely; any value
/// `>= 0` closes a connection on return once it has been established for at
/// least that long. The TCP/UDP default of 0 therefore reconnects for every
/// transaction, while serial lines stay open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPoolConfig {
    /// Minimum wall-clock gap between return and next borrow (ms).
    pub inter_transaction_delay_ms: u64,
    /// Close connections this old on return; -1 means never.
    pub reconnect_after_ms: i64,
    /// Connect attempts per borrow.
    pub connect_max_tries: u32,
    /// Bound on one connect attempt (ms).
    pub connect_timeout_ms: u64,
    /// Settle time after a successful connect before first use (ms).
    pub after_connect_delay_ms: u64,
    /// Bound on one response read (ms).
    pub read_timeout_ms: u64,
}

impl EndpointPoolConfig {
    /// Defaults for TCP and UDP endpoints.
    pub fn tcp_default() -> Self {
        Self {
            inter_transaction_delay_ms: DEFAULT_TCP_INTER_TRANSACTION_DELAY_MS,
            reconnect_after_ms: 0,
            connect_max_tries: DEFAULT_CONNECT_MAX_TRIES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            after_connect_delay_ms: 0,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// Defaults for serial endpoints: shorter pacing, connection kept open.
    pub fn serial_default() -> Self {
        Self {
            inter_transaction_delay_ms: DEFAULT_SERIAL_INTER_TRANSACTION_DELAY_MS,
            reconnect_after_ms: -1,
            connect_max_tries: DEFAULT_CONNECT_MAX_TRIES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            after_connect_delay_ms: 0,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// Set the inter-transaction delay.
    pub fn with_inter_transaction_delay_ms(mut self, ms: u64) -> Self {
        self.inter_transaction_delay_ms = ms;
        self
    }

    /// Set the reconnect-after age (-1 never).
    pub fn with_reconnect_after_ms(mut self, ms: i64) -> Self {
        self.reconnect_after_ms = ms;
        self
    }

    /// Set the connect attempt budget.
    pub fn with_connect_max_tries(mut self, tries: u32) -> Self {
        self.connect_max_tries = tries.max(1);
        self
    }

    /// Set the per-attempt connect timeout.
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set the post-connect settle delay.
    pub fn with_after_connect_delay_ms(mut self, ms: u64) -> Self {
        self.after_connect_delay_ms = ms;
        self
    }

    /// Set the response read timeout.
    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    /// Inter-transaction delay as a [`Duration`].
    pub fn inter_transaction_delay(&self) -> Duration {
        Duration::from_millis(self.inter_transaction_delay_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// True when a connection of the given age must be closed on return.
    pub fn expires_at_age(&self, age: Duration) -> bool {
        self.reconnect_after_ms >= 0 && age.as_millis() as i64 >= self.reconnect_after_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &EndpointKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_key_equality_is_structural() {
        let a = EndpointKey::tcp("10.0.0.1", 502);
        let b = EndpointKey::tcp("10.0.0.1", 502);
        let c = EndpointKey::tcp("10.0.0.1", 503);
        let d = EndpointKey::udp("10.0.0.1", 502);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_serial_key_includes_line_parameters() {
        let a = EndpointKey::serial(SerialParams::rtu_8n1("/dev/ttyUSB0", 9600));
        let mut params = SerialParams::rtu_8n1("/dev/ttyUSB0", 9600);
        params.baud_rate = 19200;
        let b = EndpointKey::serial(params);
        assert_ne!(a, b);
    }

    #[test]
    fn test_transport_defaults() {
        let tcp = EndpointKey::tcp("localhost", 502).default_pool_config();
        assert_eq!(tcp.inter_transaction_delay_ms, 60);
        assert_eq!(tcp.reconnect_after_ms, 0);

        let serial =
            EndpointKey::serial(SerialParams::rtu_8n1("/dev/ttyS0", 19200)).default_pool_config();
        assert_eq!(serial.inter_transaction_delay_ms, 35);
        assert_eq!(serial.reconnect_after_ms, -1);
    }

    #[test]
    fn test_expiry() {
        let keep_open = EndpointPoolConfig::serial_default();
        assert!(!keep_open.expires_at_age(Duration::from_secs(3600)));

        let reconnect = EndpointPoolConfig::tcp_default().with_reconnect_after_ms(1000);
        assert!(!reconnect.expires_at_age(Duration::from_millis(500)));
        assert!(reconnect.expires_at_age(Duration::from_millis(1500)));
    }
}
