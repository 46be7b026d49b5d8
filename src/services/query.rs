use serde::{Deserialize, Serialize};

use crate::aggregation::{
    validate_tags, AggregationError, AggregatorSpec, Options, Pipeline, Point, Tags,
};
use crate::services::dispatcher::{DispatchError, StoreDispatcher};
use crate::store;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A read over one metric: raw points in `[start, end]` matching `tags`,
/// optionally windowed and run through an aggregator chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointsQuery {
    pub metric: String,
    /// Inclusive lower bound, nanoseconds since the epoch.
    pub start: Option<i64>,
    /// Inclusive upper bound; defaults to now.
    pub end: Option<i64>,
    /// Maximum raw points fetched; 0 means unlimited.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub window: Option<Options>,
    #[serde(default)]
    pub aggregators: Vec<AggregatorSpec>,
}

/// A query that passed validation, with its bounds resolved.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub metric: String,
    pub tags: Tags,
    pub start: i64,
    pub end: i64,
    pub limit: usize,
    pub pipeline: Pipeline,
}

impl PointsQuery {
    pub fn prepare(&self, now: i64) -> Result<PreparedQuery, QueryError> {
        let metric = self.metric.trim();
        if metric.is_empty() {
            return Err(QueryError::Invalid("metric is required".to_string()));
        }
        let start = self
            .start
            .ok_or_else(|| QueryError::Invalid("start is required".to_string()))?;
        let end = self.end.unwrap_or(now);
        if end < start {
            return Err(QueryError::Invalid(format!(
                "end ({end}) must not be before start ({start})"
            )));
        }
        validate_tags(&self.tags)?;
        let pipeline = Pipeline::compile(self.window.as_ref(), &self.aggregators)?;
        pipeline.check_range(start, end)?;
        Ok(PreparedQuery {
            metric: metric.to_string(),
            tags: self.tags.clone(),
            start,
            end,
            limit: self.limit,
            pipeline,
        })
    }
}

/// Validates `query`, reads its raw points through the dispatcher at
/// `priority`, then windows and aggregates them off the worker thread.
pub async fn query_points(
    dispatcher: &StoreDispatcher,
    priority: i32,
    query: &PointsQuery,
    now: i64,
) -> Result<Vec<Point>, QueryError> {
    let prepared = query.prepare(now)?;
    let (metric, tags) = (prepared.metric.clone(), prepared.tags.clone());
    let (start, end, limit) = (prepared.start, prepared.end, prepared.limit);

    let raw = dispatcher
        .submit(priority, move |conn| {
            store::query_raw_points(conn, &metric, &tags, start, end, limit)
                .map_err(QueryError::from)
        })
        .await?;
    tracing::debug!(
        metric = %prepared.metric,
        raw_points = raw.len(),
        windowed = prepared.pipeline.is_windowed(),
        "query fetched raw points"
    );
    Ok(prepared.pipeline.run(start, end, raw)?)
}
