//! Simulation of a fleet of instances sharing one counter.
//!
//! Each instance runs on its own thread with its own [`SharedCounter`], all
//! reconciling into the same [`MemoryStore`]. At the end every instance is
//! flushed and the shared total is checked against the sum of all
//! increments.
//!
//! Run with:
//! ```bash
//! cargo run --example simulation --features demo -- --help
//! RUST_LOG=condiviso=debug cargo run --example simulation --features demo
//! ```

use clap::{Parser, ValueEnum};
use condiviso::config::CounterConfig;
use condiviso::counter::SharedCounter;
use condiviso::observers::json::JsonObserver;
use condiviso::observers::table::{TableObserver, TableStyle};
use condiviso::store::{MemoryStore, SharedStore};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Output format for the final statistics.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Pretty ASCII table
    Table,
    /// Markdown table
    Markdown,
    /// JSON format
    Json,
}

/// Simulates N instances incrementing one shared counter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of instances
    #[arg(short, long, default_value = "4")]
    instances: usize,

    /// Increments per instance
    #[arg(long, default_value = "10000")]
    iterations: u64,

    /// Largest single increment
    #[arg(long, default_value = "500")]
    max_increment: u64,

    /// Refresh interval (e.g. 10ms, 1s)
    #[arg(short, long, default_value = "10ms", value_parser = humantime::parse_duration)]
    refresh: Duration,

    /// Extra transactions after a conflict
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Pause between increments, in microseconds
    #[arg(long, default_value = "50")]
    pause_us: u64,

    /// Initial shared total
    #[arg(long, default_value = "0")]
    initial: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("condiviso=warn")),
        )
        .init();

    let args = Args::parse();
    let store = Arc::new(MemoryStore::new());
    let config = CounterConfig::new()
        .with_key("simulation")
        .with_refresh_interval(args.refresh)
        .with_max_retries(args.retries);
    store.set(&config.key, args.initial)?;

    let counters: Vec<_> = (0..args.instances)
        .map(|_| Arc::new(SharedCounter::new(Arc::clone(&store), config.clone())))
        .collect();

    let start = Instant::now();
    let handles: Vec<_> = counters
        .iter()
        .enumerate()
        .map(|(i, counter)| {
            let counter = Arc::clone(counter);
            let iterations = args.iterations;
            let max_increment = args.max_increment.max(1);
            let pause = Duration::from_micros(args.pause_us);
            thread::spawn(move || {
                let mut absorbed = 0;
                for j in 0..iterations {
                    // Cheap deterministic spread of increment sizes.
                    let n = (j * 31 + i as u64 * 17) % (max_increment + 1);
                    counter.add(n);
                    absorbed += n;
                    if !pause.is_zero() {
                        thread::sleep(pause);
                    }
                }
                absorbed
            })
        })
        .collect();

    let mut expected = args.initial;
    for handle in handles {
        expected += handle.join().map_err(|_| "instance thread panicked")?;
    }
    let elapsed = start.elapsed();

    for counter in &counters {
        counter.sync_now()?;
    }
    // A second pass lets the first instances see the last contributions.
    for counter in &counters {
        counter.sync_now()?;
    }

    let snapshots: Vec<_> = counters.iter().map(|c| c.stats()).collect();
    match args.format {
        OutputFormat::Table | OutputFormat::Markdown => {
            let style = match args.format {
                OutputFormat::Markdown => TableStyle::Markdown,
                _ => TableStyle::Rounded,
            };
            TableObserver::new()
                .with_style(style)
                .with_title(format!(
                    "{} instances, {} increments each, {:?}",
                    args.instances, args.iterations, elapsed
                ))
                .write(std::io::stdout().lock(), &snapshots)?;
        }
        OutputFormat::Json => {
            println!(
                "{}",
                JsonObserver::new()
                    .pretty(true)
                    .include_timestamp(true)
                    .to_json(&snapshots)?
            );
        }
    }

    let shared = store.get(&config.key)?.unwrap_or(0);
    println!("shared total: {shared}, expected: {expected}");
    if shared != expected {
        return Err(format!("shared total diverged by {}", expected.abs_diff(shared)).into());
    }
    Ok(())
}
