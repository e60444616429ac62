//! Connection handles owning the spawned link tasks
//!
//! Both handles cancel their tasks when dropped; `stop` additionally waits
//! for them to finish.

pub mod receiver;
pub mod sender;


pub use receiver::ReceiverConnection;
pub use sender::SenderConnection;
