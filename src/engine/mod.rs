//! Reliability engines.
//!
//! The engines hold all protocol state and never spawn anything themselves;
//! [`Driver`](crate::driver::Driver) feeds them datagrams and clock ticks.

pub mod buffer;
pub mod interpolate;
pub mod receiver;
pub mod sender;

pub use buffer::ReceiveBuffer;
pub use receiver::{Disposition, ReceiverEngine, ReceiverOutputs};
pub use sender::{PendingAck, SenderEngine, SenderOutputs, TimeoutReport};
