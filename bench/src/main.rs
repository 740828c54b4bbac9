use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod client;
mod report;
mod scenario;
mod stats;

use client::BenchClient;

#[derive(Parser, Debug)]
#[command(version, about = "Upload and download benchmarks for both filestore backends")]
struct Cli {
    /// Server base url
    #[arg(default_value = "http://localhost:5000")]
    base_url: String,

    /// File sizes in bytes, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [10 * 1024, 100 * 1024, 1024 * 1024, 10 * 1024 * 1024]
    )]
    sizes: Vec<usize>,

    /// Requests per scenario
    #[arg(long, default_value_t = 10)]
    count: usize,

    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Per request timeout
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    info!(base_url = cli.base_url.as_str(), "running benchmarks");
    let client = BenchClient::new(&cli.base_url, Duration::from_secs(cli.timeout_secs))?;
    let results = scenario::run_suite(&client, &cli.sizes, cli.count).await;

    let path = report::write_report(&cli.results_dir, &results, Utc::now()).await?;
    println!("\nResults saved to: {}", path.display());
    Ok(())
}
