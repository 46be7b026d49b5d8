use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::store;
use super::types::{DownsampleError, DownsampleOutcome, Downsampler, NewDownsampler};
use crate::aggregation::Pipeline;
use crate::config::StoreConfig;
use crate::services::dispatcher::StoreDispatcher;
use crate::store as points;

/// Runs downsampler `id` once inside a single transaction.
///
/// Nothing is written, and the progress mark does not move, unless every
/// step succeeds; a failed run is simply repeated on the next tick.
pub fn run_once(conn: &mut Connection, id: i64) -> Result<DownsampleOutcome, DownsampleError> {
    let tx = conn.transaction()?;
    let downsampler = store::get_downsampler(&tx, id)?.ok_or(DownsampleError::NotFound(id))?;
    let outcome = downsample(&tx, &downsampler)?;
    tx.commit()?;
    Ok(outcome)
}

fn downsample(
    conn: &Connection,
    downsampler: &Downsampler,
) -> Result<DownsampleOutcome, DownsampleError> {
    let pipeline = Pipeline::compile(Some(&downsampler.window), &downsampler.aggregators)?;
    let source = downsampler.source_metric.as_str();
    let tags = &downsampler.tags;
    let mark = downsampler.last_progress_mark;

    let Some(end) = points::latest_timestamp(conn, source, tags)? else {
        return Ok(DownsampleOutcome::NoSourceData);
    };
    let start = match mark {
        Some(mark) => mark,
        None => match points::earliest_timestamp(conn, source, tags)? {
            Some(earliest) => earliest,
            None => return Ok(DownsampleOutcome::NoSourceData),
        },
    };
    if end < start {
        return Ok(DownsampleOutcome::Written {
            upserted: false,
            inserted: 0,
            progress_mark: start,
        });
    }
    pipeline.check_range(start, end)?;

    let raw = points::query_raw_points(conn, source, tags, start, end, 0)?;
    let mut results = pipeline.run(start, end, raw)?;

    // The bucket at the mark may have been open when the last run wrote it.
    let boundary = if results
        .first()
        .is_some_and(|first| mark == Some(first.timestamp))
    {
        Some(results.remove(0))
    } else {
        None
    };
    if let Some(point) = &boundary {
        points::upsert_point(conn, &downsampler.out_metric, tags, point)?;
    }
    let inserted = points::insert_points(conn, &downsampler.out_metric, tags, &results)?;

    let Some(progress_mark) = results
        .last()
        .or(boundary.as_ref())
        .map(|point| point.timestamp)
        .or(mark)
    else {
        return Ok(DownsampleOutcome::NoSourceData);
    };
    if mark != Some(progress_mark) {
        store::set_progress_mark(conn, downsampler.id, progress_mark)?;
    }

    Ok(DownsampleOutcome::Written {
        upserted: boundary.is_some(),
        inserted,
        progress_mark,
    })
}

/// Owns the per-downsampler timers and routes every run through the store
/// dispatcher at the background priority.
pub struct DownsampleService {
    store: Arc<StoreDispatcher>,
    priority: i32,
    min_run_every: Duration,
    scheduling: bool,
    cancel: CancellationToken,
    running: Mutex<HashMap<i64, CancellationToken>>,
}

impl DownsampleService {
    pub fn new(store: Arc<StoreDispatcher>, config: &StoreConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            priority: config.downsample_priority,
            min_run_every: config.min_run_every,
            scheduling: config.enable_downsampling,
            cancel,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules every persisted downsampler. Returns how many were found.
    pub async fn start(self: &Arc<Self>) -> Result<usize, DownsampleError> {
        let downsamplers = self.list().await?;
        if self.scheduling {
            for downsampler in &downsamplers {
                self.schedule(downsampler).await;
            }
        }
        Ok(downsamplers.len())
    }

    pub async fn list(&self) -> Result<Vec<Downsampler>, DownsampleError> {
        self.store
            .submit(self.priority, |conn| store::list_downsamplers(conn))
            .await
    }

    pub async fn create(
        self: &Arc<Self>,
        request: NewDownsampler,
    ) -> Result<Downsampler, DownsampleError> {
        let run_every_ns = request.validate(self.min_run_every)?;
        let created = self
            .store
            .submit(self.priority, move |conn| {
                store::create_downsampler(conn, &request, run_every_ns)
            })
            .await?;
        tracing::info!(
            id = created.id,
            source = %created.source_metric,
            out = %created.out_metric,
            "downsampler created"
        );
        if self.scheduling {
            self.schedule(&created).await;
        }
        Ok(created)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DownsampleError> {
        self.unschedule(id).await;
        let deleted = self
            .store
            .submit(self.priority, move |conn| store::delete_downsampler(conn, id))
            .await?;
        if !deleted {
            return Err(DownsampleError::NotFound(id));
        }
        tracing::info!(id, "downsampler deleted");
        Ok(())
    }

    /// Runs `id` once now, queued behind any higher-priority work.
    pub async fn run_now(&self, id: i64) -> Result<DownsampleOutcome, DownsampleError> {
        self.store
            .submit(self.priority, move |conn| run_once(conn, id))
            .await
    }

    pub async fn schedule(self: &Arc<Self>, downsampler: &Downsampler) {
        let id = downsampler.id;
        let token = self.cancel.child_token();
        if let Some(previous) = self.running.lock().await.insert(id, token.clone()) {
            previous.cancel();
        }

        let service = self.clone();
        let every = downsampler.run_every();
        let span = tracing::info_span!(
            "downsampler",
            id,
            source = %downsampler.source_metric,
            out = %downsampler.out_metric,
        );
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            match service.run_now(id).await {
                                Ok(DownsampleOutcome::NoSourceData) => {
                                    tracing::debug!("no source data yet");
                                }
                                Ok(DownsampleOutcome::Written { upserted, inserted, progress_mark }) => {
                                    tracing::info!(upserted, inserted, progress_mark, "downsample run committed");
                                }
                                Err(DownsampleError::NotFound(_)) => {
                                    tracing::warn!("downsampler vanished; stopping timer");
                                    service.running.lock().await.remove(&id);
                                    break;
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "downsample tick failed");
                                }
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );
    }

    pub async fn unschedule(&self, id: i64) {
        if let Some(token) = self.running.lock().await.remove(&id) {
            token.cancel();
        }
    }

    pub async fn scheduled(&self) -> usize {
        self.running.lock().await.len()
    }
}
