use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tsdb_core::db;
use tsdb_core::services::downsampler::{run_once, store, DownsampleOutcome};

#[derive(Parser, Debug)]
#[command(
    about = "Ops tool: run a single downsampler pass against a database file (transactional). \
             Do not run it while the server is scheduling the same downsampler id."
)]
struct Args {
    #[arg(long, default_value = "data/tsdb.sqlite3")]
    database: PathBuf,
    /// Downsampler id to run. Omit with --list to print the configured downsamplers.
    #[arg(long)]
    id: Option<i64>,
    #[arg(long, default_value_t = false)]
    list: bool,
    #[arg(long, default_value_t = 5_000)]
    busy_timeout_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut conn = db::open(&args.database, Duration::from_millis(args.busy_timeout_ms))?;

    if args.list {
        for downsampler in store::list_downsamplers(&conn)? {
            println!(
                "{}\t{} -> {}\tevery={}\tmark={}",
                downsampler.id,
                downsampler.source_metric,
                downsampler.out_metric,
                humantime::format_duration(downsampler.run_every()),
                downsampler
                    .last_progress_mark
                    .map_or_else(|| "none".to_string(), |mark| mark.to_string()),
            );
        }
        return Ok(());
    }

    let id = args.id.context("--id is required unless --list is given")?;
    match run_once(&mut conn, id).with_context(|| format!("downsampler {id} failed"))? {
        DownsampleOutcome::NoSourceData => println!("downsampler {id}: no source data"),
        DownsampleOutcome::Written {
            upserted,
            inserted,
            progress_mark,
        } => println!(
            "downsampler {id}: inserted={inserted} upserted={upserted} progress_mark={progress_mark}"
        ),
    }
    Ok(())
}
