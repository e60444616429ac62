//! Error types for the telemetry link.
//!
//! All errors implement `std::error::Error` and carry enough context to log a
//! useful line. Most of them never cross the engine boundary: decode failures
//! are logged and dropped, send failures become [`SenderEvent`](crate::SenderEvent)s.
//! The ones callers do see come from `start`, `send` and configuration loading.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: bind, send and receive failures on the socket
//! - **Parse Errors**: malformed or foreign datagrams
//! - **Configuration Errors**: invalid settings or unreadable config files
//!
//! ```rust
//! use shiplink::LinkError;
//!
//! let error = LinkError::invalid_config("max_buffer_size must be greater than zero");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Failed to bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send datagram to {dest}")]
    Send {
        dest: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to receive datagram: {source}")]
    Receive {
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Config file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("{component} is not running")]
    NotRunning { component: String },

    #[error("Sequence numbers exhausted after {last}")]
    SequenceExhausted { last: u32 },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Bind { .. } => true,
            LinkError::Send { .. } => true,
            LinkError::Receive { .. } => true,
            LinkError::NotRunning { .. } => true,
            LinkError::Parse { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::ConfigFile { .. } => false,
            LinkError::Yaml(_) => false,
            LinkError::SequenceExhausted { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Bind { .. } => vec![
                "Check that no other process is listening on the port",
                "Choose a different listening port",
                "Verify permissions for privileged ports",
            ],
            LinkError::Send { .. } => vec![
                "Verify the target address is reachable",
                "Check local firewall rules",
                "Retry on the next timeout check",
            ],
            LinkError::Receive { .. } => vec![
                "Check the socket is still bound",
                "Restart the listener",
            ],
            LinkError::Parse { .. } => vec![
                "Verify the peer speaks the same wire format",
                "Check for foreign traffic on the port",
            ],
            LinkError::Config { .. } => vec![
                "Check configuration values are within range",
                "Fall back to default configuration",
            ],
            LinkError::ConfigFile { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            LinkError::Yaml(_) => vec![
                "Check YAML syntax",
                "Compare field names against the documented configuration",
            ],
            LinkError::NotRunning { .. } => vec![
                "Start the connection before using it",
                "Check for an earlier bind failure",
            ],
            LinkError::SequenceExhausted { .. } => vec![
                "Reconnect the sender to start a new stream",
            ],
        }
    }

    /// Helper constructor for bind failures.
    pub fn bind_failed(addr: SocketAddr, source: std::io::Error) -> Self {
        LinkError::Bind { addr, source }
    }

    /// Helper constructor for send failures.
    pub fn send_failed(dest: SocketAddr, source: std::io::Error) -> Self {
        LinkError::Send { dest, source }
    }

    /// Helper constructor for receive failures.
    pub fn receive_failed(source: std::io::Error) -> Self {
        LinkError::Receive { source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }

    /// Helper constructor for use-after-stop errors.
    pub fn not_running(component: impl Into<String>) -> Self {
        LinkError::NotRunning { component: component.into() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::receive_failed(err)
    }
}
