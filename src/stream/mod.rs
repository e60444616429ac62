//! Stream combinators for telemetry consumers

pub mod throttle;

pub use throttle::{Sequenced, Throttle, ThrottleExt};
