use crate::config::{StoreConfig, DEFAULT_DOWNSAMPLE_PRIORITY, DEFAULT_QUERY_PRIORITY};
use crate::db;
use crate::services::dispatcher::StoreDispatcher;
use crate::services::downsampler::DownsampleService;
use crate::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn test_config() -> StoreConfig {
    StoreConfig {
        database_path: PathBuf::from(":memory:"),
        busy_timeout: Duration::from_millis(500),
        query_priority: DEFAULT_QUERY_PRIORITY,
        downsample_priority: DEFAULT_DOWNSAMPLE_PRIORITY,
        min_run_every: Duration::from_secs(1),
        enable_downsampling: false,
    }
}

/// State over a fresh in-memory store. Downsamplers are persisted but not
/// scheduled, so tests drive runs explicitly.
pub fn test_state() -> AppState {
    let config = test_config();
    let conn = db::open_in_memory().expect("in-memory db");
    let store = Arc::new(StoreDispatcher::start("test-store", conn).expect("dispatcher"));
    let downsamplers = Arc::new(DownsampleService::new(
        store.clone(),
        &config,
        CancellationToken::new(),
    ));
    AppState {
        config,
        store,
        downsamplers,
    }
}
