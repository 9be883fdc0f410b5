//! Stream combinators used by the frame receiver.

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
