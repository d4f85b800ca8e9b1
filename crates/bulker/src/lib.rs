#![doc = include_str!("../README.md")]

mod accumulator;
mod batch;
mod dispatch;
mod error;
mod handler;
mod options;
mod request;
mod stats;
mod window;

pub use crate::accumulator::{Accumulate, Accumulator};
pub use crate::error::*;
pub use crate::handler::*;
pub use crate::options::*;
pub use crate::request::Submission;
pub use crate::stats::StatsSnapshot;
// Re-exported so callers can build cancellation tokens without depending on
// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
