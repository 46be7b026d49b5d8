use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tsdb-core",
    version,
    about = "Time-series store with windowed aggregation and downsampling"
)]
pub struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 8086)]
    pub port: u16,
    /// SQLite database file; overrides TSDB_DATABASE_PATH.
    #[arg(long)]
    pub database: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub print_openapi: bool,
}
