use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tsdb_core::services::dispatcher::StoreDispatcher;
use tsdb_core::services::downsampler::DownsampleService;
use tsdb_core::{cli, config, db, openapi, routes, state};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind tsdb-core listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => Err(err).with_context(|| format!("failed to bind tsdb-core listener on {addr}")),
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to listen for ctrl-c");
            }
        }
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::StoreConfig::from_env(args.database)?;
    let conn = db::open(&config.database_path, config.busy_timeout)?;
    let store = Arc::new(
        StoreDispatcher::start("store-dispatcher", conn).context("failed to start store dispatcher")?,
    );
    tracing::info!(
        path = %config.database_path.display(),
        query_priority = config.query_priority,
        downsample_priority = config.downsample_priority,
        "store opened"
    );

    let cancel = CancellationToken::new();
    let downsamplers = Arc::new(DownsampleService::new(store.clone(), &config, cancel.clone()));
    match downsamplers.start().await {
        Ok(count) => tracing::info!(
            count,
            scheduling = config.enable_downsampling,
            "downsamplers loaded"
        ),
        Err(err) => tracing::warn!(error = %err, "failed to load downsamplers"),
    }

    let state = state::AppState {
        config: config.clone(),
        store: store.clone(),
        downsamplers,
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    store.shutdown();
    tracing::info!("store closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bind_listener;
    use anyhow::Result;

    #[tokio::test]
    async fn reports_port_in_use_with_actionable_message() -> Result<()> {
        let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                // Sandbox environments can block binding attempts.
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;

        let err = bind_listener(&addr.to_string()).await.unwrap_err();
        if err.to_string().to_lowercase().contains("operation not permitted") {
            return Ok(());
        }
        let message = err.to_string().to_lowercase();

        assert!(message.contains(&addr.to_string()));
        assert!(message.contains("port already in use"));
        assert!(message.contains("--port"));

        drop(listener);
        Ok(())
    }
}
