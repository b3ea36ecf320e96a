//! Plan a planet download
//!
//! Probes every configured mirror, reconciles what they report, and prints
//! the chosen snapshot together with the URLs to fetch it from.
//!
//! ```text
//! cargo run --example plan_planet -- --verbose --save planet-urls.tsv
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use planet_mirrors::{Catalog, Config};
use tracing_subscriber::EnvFilter;

/// Pick a planet snapshot and the mirrors to download it from.
#[derive(Debug, Parser)]
#[command(name = "plan_planet")]
struct Args {
    /// JSON configuration file (defaults to the built-in mirror list)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep primary-mirror URLs in the plan
    #[arg(long)]
    use_primary: bool,

    /// Take the newest snapshot even if few mirrors carry it
    #[arg(long)]
    force_latest: bool,

    /// Log per-source detail
    #[arg(short, long)]
    verbose: bool,

    /// Write the URLs as one tab-separated row
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,

    /// Write the full run as JSON
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

async fn plan(args: Args) -> planet_mirrors::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.options.use_primary |= args.use_primary;
    config.options.force_latest |= args.force_latest;
    config.options.verbose |= args.verbose;

    let run = Catalog::new(config)?.run().await?;

    for mirror in &run.unreachable {
        eprintln!("skipped mirror {}: {}", mirror.mirror, mirror.reason);
    }
    println!("{}", run.reconciliation.summary);
    for url in &run.reconciliation.plan.urls {
        println!("  {url}");
    }

    if let Some(path) = &args.save {
        run.save_urls(path).await?;
    }
    if let Some(path) = &args.json {
        run.save_report(path).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match plan(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "planning failed");
            ExitCode::FAILURE
        }
    }
}
