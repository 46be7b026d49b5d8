use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATABASE_PATH: &str = "data/tsdb.sqlite3";

pub const DEFAULT_QUERY_PRIORITY: i32 = 100;
pub const DEFAULT_DOWNSAMPLE_PRIORITY: i32 = 10;

pub(crate) fn setup_config_path() -> Option<PathBuf> {
    env_optional_string("TSDB_SETUP_CONFIG_PATH").map(PathBuf::from)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_path: Option<String>,
    #[serde(default)]
    busy_timeout_ms: Option<u64>,
    #[serde(default)]
    query_priority: Option<i32>,
    #[serde(default)]
    downsample_priority: Option<i32>,
    #[serde(default)]
    min_run_every_seconds: Option<u64>,
    #[serde(default)]
    enable_downsampling: Option<bool>,
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path()?;
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

/// Setup-file values only fill in what the environment left unset.
fn apply_setup_overrides(config: &mut StoreConfig, overrides: &SetupConfigOverrides) {
    if env_optional_string("TSDB_BUSY_TIMEOUT_MS").is_none() {
        if let Some(ms) = overrides.busy_timeout_ms.filter(|v| *v != 0) {
            config.busy_timeout = Duration::from_millis(ms);
        }
    }
    if env_optional_string("TSDB_QUERY_PRIORITY").is_none() {
        if let Some(priority) = overrides.query_priority {
            config.query_priority = priority;
        }
    }
    if env_optional_string("TSDB_DOWNSAMPLE_PRIORITY").is_none() {
        if let Some(priority) = overrides.downsample_priority {
            config.downsample_priority = priority;
        }
    }
    if env_optional_string("TSDB_MIN_RUN_EVERY_SECONDS").is_none() {
        if let Some(seconds) = overrides.min_run_every_seconds.filter(|v| *v != 0) {
            config.min_run_every = Duration::from_secs(seconds);
        }
    }
    if env_optional_string("TSDB_ENABLE_DOWNSAMPLING").is_none() {
        if let Some(enabled) = overrides.enable_downsampling {
            config.enable_downsampling = enabled;
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub busy_timeout: Duration,
    /// Dispatcher priority of foreground reads and writes.
    pub query_priority: i32,
    /// Dispatcher priority of scheduled downsample runs.
    pub downsample_priority: i32,
    /// Floor for a downsampler's `run_every`.
    pub min_run_every: Duration,
    pub enable_downsampling: bool,
}

impl StoreConfig {
    pub fn from_env(cli_database: Option<PathBuf>) -> Result<Self> {
        let setup_overrides = load_setup_config_overrides();

        let database_path = cli_database
            .or_else(|| env_optional_string("TSDB_DATABASE_PATH").map(PathBuf::from))
            .or_else(|| {
                setup_overrides
                    .as_ref()
                    .and_then(|ov| ov.database_path.as_deref())
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        if database_path.as_os_str().is_empty() {
            anyhow::bail!("TSDB_DATABASE_PATH resolved to an empty path");
        }

        let busy_timeout =
            Duration::from_millis(env_u64("TSDB_BUSY_TIMEOUT_MS", 5_000).clamp(1, 600_000));
        let query_priority = env_i32("TSDB_QUERY_PRIORITY", DEFAULT_QUERY_PRIORITY);
        let downsample_priority = env_i32("TSDB_DOWNSAMPLE_PRIORITY", DEFAULT_DOWNSAMPLE_PRIORITY);
        let min_run_every = Duration::from_secs(env_u64("TSDB_MIN_RUN_EVERY_SECONDS", 1).max(1));
        let enable_downsampling = env_bool("TSDB_ENABLE_DOWNSAMPLING", true);

        let mut config = Self {
            database_path,
            busy_timeout,
            query_priority,
            downsample_priority,
            min_run_every,
            enable_downsampling,
        };

        if let Some(overrides) = setup_overrides.as_ref() {
            apply_setup_overrides(&mut config, overrides);
        }

        if config.downsample_priority >= config.query_priority {
            tracing::warn!(
                query_priority = config.query_priority,
                downsample_priority = config.downsample_priority,
                "downsample priority is not below query priority; background runs may delay queries"
            );
        }

        Ok(config)
    }
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
