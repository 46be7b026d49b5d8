//! Continuous downsampling of a source metric into a coarser derived metric.

pub mod runner;
pub mod store;
pub mod types;

pub use runner::{run_once, DownsampleService};
pub use types::{DownsampleError, DownsampleOutcome, Downsampler, NewDownsampler};
