//! Sender and receiver configuration.
//!
//! Both configs deserialize with defaults for every missing field, so a YAML
//! file only needs the values it changes:
//!
//! ```rust
//! use shiplink::LinkConfig;
//!
//! let config = LinkConfig::from_yaml_str(
//!     "receiver:\n  port: 23456\n  interpolation_enabled: false\nsender:\n  max_retransmissions: 5\n",
//! )?;
//! assert_eq!(config.receiver.port, 23456);
//! assert_eq!(config.receiver.max_buffer_size, 1000);
//! assert_eq!(config.sender.max_retransmissions, 5);
//! # Ok::<(), shiplink::LinkError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::{LinkError, Result};

/// Default telemetry port.
pub const DEFAULT_PORT: u16 = 12345;

/// Receiving side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Interface to bind
    pub bind_address: IpAddr,

    /// UDP port to listen on, 0 for an ephemeral port
    pub port: u16,

    /// Upper bound on buffered packets kept for gap filling
    pub max_buffer_size: usize,

    /// How long a gap stays open before its sequences are declared lost
    pub packet_timeout_ms: u64,

    /// Interpolate lost samples instead of repeating the last valid one
    pub interpolation_enabled: bool,

    pub gap_check_interval_ms: u64,

    pub cleanup_interval_ms: u64,

    /// Buffered notifications per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_buffer_size: 1000,
            packet_timeout_ms: 0,
            interpolation_enabled: true,
            gap_check_interval_ms: 1000,
            cleanup_interval_ms: 10_000,
            channel_capacity: 1024,
        }
    }
}

impl ReceiverConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn with_packet_timeout(mut self, timeout: Duration) -> Self {
        self.packet_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.interpolation_enabled = enabled;
        self
    }

    pub fn with_gap_check_interval(mut self, interval: Duration) -> Self {
        self.gap_check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    pub fn gap_check_interval(&self) -> Duration {
        Duration::from_millis(self.gap_check_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_size == 0 {
            return Err(LinkError::invalid_config("max_buffer_size must be greater than zero"));
        }
        if self.gap_check_interval_ms == 0 {
            return Err(LinkError::invalid_config("gap_check_interval_ms must be greater than zero"));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(LinkError::invalid_config("cleanup_interval_ms must be greater than zero"));
        }
        if self.channel_capacity == 0 {
            return Err(LinkError::invalid_config("channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Sending side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Where telemetry goes
    pub target: SocketAddr,

    /// Local address for the sending socket; ACKs come back here
    pub bind_address: SocketAddr,

    pub ack_timeout_ms: u64,

    /// Retransmissions per packet before it is abandoned
    pub max_retransmissions: u32,

    /// Request ACKs and retransmit; off means fire and forget
    pub reliability_enabled: bool,

    pub timeout_check_interval_ms: u64,

    /// Buffered events per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            ack_timeout_ms: 3000,
            max_retransmissions: 3,
            reliability_enabled: true,
            timeout_check_interval_ms: 1000,
            channel_capacity: 1024,
        }
    }
}

impl SenderConfig {
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_retransmissions(mut self, retries: u32) -> Self {
        self.max_retransmissions = retries;
        self
    }

    pub fn with_reliability(mut self, enabled: bool) -> Self {
        self.reliability_enabled = enabled;
        self
    }

    pub fn with_timeout_check_interval(mut self, interval: Duration) -> Self {
        self.timeout_check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn timeout_check_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_check_interval_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_check_interval_ms == 0 {
            return Err(LinkError::invalid_config(
                "timeout_check_interval_ms must be greater than zero",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(LinkError::invalid_config("channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Both sides of a link, as stored in a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub receiver: ReceiverConfig,
    pub sender: SenderConfig,
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)?;
        config.receiver.validate()?;
        config.sender.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| LinkError::ConfigFile { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}
