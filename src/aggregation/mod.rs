//! Windowing and chained aggregation over time-sorted point streams.
//!
//! Everything here is pure computation over in-memory vectors; store access
//! happens in `services::query` before a [`Pipeline`] is run.

pub mod aggregators;
pub mod bucket;
pub mod error;
mod options;
pub mod pipeline;
pub mod types;
pub mod window;

pub use aggregators::{Aggregator, DeviationMode};
pub use bucket::bucketize;
pub use error::AggregationError;
pub use pipeline::{apply_aggregator, Pipeline};
pub use types::{validate_tags, AggregatorSpec, Options, Point, Tags, WindowSpec};
pub use window::{bucket_count, bucket_start, check_bucket_limit, window, MAX_WINDOW_BUCKETS};

pub(crate) use options::parse_duration_nanos;
