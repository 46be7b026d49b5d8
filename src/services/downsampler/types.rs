use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::aggregation::{
    parse_duration_nanos, validate_tags, AggregationError, AggregatorSpec, Options, Pipeline,
    Tags,
};
use crate::services::dispatcher::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum DownsampleError {
    #[error("downsampler {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("corrupt downsampler record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A persisted continuous downsample of `source_metric` into `out_metric`.
///
/// `tags` filters the source series and is also the fixed tag set written
/// on every output point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Downsampler {
    pub id: i64,
    pub source_metric: String,
    pub out_metric: String,
    pub tags: Tags,
    #[schema(value_type = Object)]
    pub window: Options,
    pub aggregators: Vec<AggregatorSpec>,
    pub run_every_ns: i64,
    /// Bucket start of the last output point committed; `None` until the
    /// first run writes something.
    pub last_progress_mark: Option<i64>,
}

impl Downsampler {
    pub fn run_every(&self) -> Duration {
        Duration::from_nanos(u64::try_from(self.run_every_ns).unwrap_or(1).max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDownsampler {
    pub source_metric: String,
    pub out_metric: String,
    #[serde(default)]
    pub tags: Tags,
    #[schema(value_type = Object)]
    pub window: Options,
    #[serde(default)]
    pub aggregators: Vec<AggregatorSpec>,
    /// Duration string (`"5m"`) or integer nanoseconds.
    #[schema(value_type = String, example = "5m")]
    pub run_every: JsonValue,
}

impl NewDownsampler {
    /// Checks the request and returns `run_every` in nanoseconds.
    pub fn validate(&self, min_run_every: Duration) -> Result<i64, DownsampleError> {
        if self.source_metric.trim().is_empty() {
            return Err(DownsampleError::Invalid("sourceMetric is required".to_string()));
        }
        if self.out_metric.trim().is_empty() {
            return Err(DownsampleError::Invalid("outMetric is required".to_string()));
        }
        if self.source_metric.trim() == self.out_metric.trim() {
            return Err(DownsampleError::Invalid(
                "outMetric must differ from sourceMetric".to_string(),
            ));
        }

        validate_tags(&self.tags)?;
        Pipeline::compile(Some(&self.window), &self.aggregators)?;

        let run_every_ns = parse_duration_nanos(&self.run_every)
            .map_err(|err| DownsampleError::Invalid(format!("runEvery: {err}")))?;
        if (run_every_ns as u128) < min_run_every.as_nanos() {
            return Err(DownsampleError::Invalid(format!(
                "runEvery must be at least {}",
                humantime::format_duration(min_run_every)
            )));
        }
        Ok(run_every_ns)
    }
}

/// What a single scheduled run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownsampleOutcome {
    /// The source has no points matching the tag filter yet.
    NoSourceData,
    Written {
        /// The boundary bucket at the previous mark was rewritten in place.
        upserted: bool,
        inserted: usize,
        progress_mark: i64,
    },
}
