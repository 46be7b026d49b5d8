use crate::config::StoreConfig;
use crate::services::dispatcher::StoreDispatcher;
use crate::services::downsampler::DownsampleService;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: StoreConfig,
    pub store: Arc<StoreDispatcher>,
    pub downsamplers: Arc<DownsampleService>,
}

impl FromRef<AppState> for Arc<StoreDispatcher> {
    fn from_ref(state: &AppState) -> Arc<StoreDispatcher> {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<DownsampleService> {
    fn from_ref(state: &AppState) -> Arc<DownsampleService> {
        state.downsamplers.clone()
    }
}
