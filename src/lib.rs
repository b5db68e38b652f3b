//! A concurrent delay queue: values are inserted with a delay and can only be retrieved once
//! that delay has elapsed.
//!
//! Background sort, mover and signal tasks promote matured values from a wait list into a ready
//! buffer on a fixed tick.

#![warn(missing_docs)]

mod config;
mod delay_queue;
mod delayed;
mod error;
mod ready_buffer;
mod tasks;
mod wait_list;

pub use config::QueueConfig;
pub use delay_queue::{DelayQueue, QueueState};
pub use delayed::{DelayItem, Delayed};
pub use error::{QueueError, QueueResult};
