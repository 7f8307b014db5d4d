use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use sar_core::{DirectorySource, ElevationSource, SearchService, SimulationRequest};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lost-person probability simulation", long_about = None)]
struct Args {
    /// Path to a SimulationRequest JSON file
    request: PathBuf,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Directory of .hgt tiles to read on cache misses
    #[arg(long)]
    elevation_dir: Option<PathBuf>,

    /// Base URL to download .hgt tiles from (requires the http-source feature)
    #[arg(long, conflicts_with = "elevation_dir")]
    elevation_url: Option<String>,

    /// Override the request's horizon (hours)
    #[arg(long)]
    horizon_hours: Option<f64>,

    /// Emit compact JSON
    #[arg(long, default_value_t = false)]
    compact: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let request_json = fs::read_to_string(&args.request)
        .with_context(|| format!("Failed to read request at {}", args.request.display()))?;
    let mut request: SimulationRequest = serde_json::from_str(&request_json)
        .with_context(|| format!("Failed to parse request JSON at {}", args.request.display()))?;
    if args.horizon_hours.is_some() {
        request.horizon_hours = args.horizon_hours;
    }

    let service = SearchService::from_env(elevation_source(&args)?, None);
    let result = service.simulate(&request, None).context("Simulation failed")?;
    let report = result.to_report(service.config().export_epsilon);
    let json = if args.compact {
        sar_schema::report_to_json(&report)?
    } else {
        sar_schema::report_to_json_pretty(&report)?
    };

    match &args.output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(
                target: "sar::service",
                frames = report.frames.len(),
                path = %path.display(),
                "report.written"
            );
        }
        None => println!("{json}"),
    }

    if let Some(tiles) = service.tile_cache() {
        let stats = tiles.get_cache_stats();
        info!(target: "sar::tiles", ?stats, "tile_cache.stats");
    }
    Ok(())
}

fn elevation_source(args: &Args) -> Result<Option<Arc<dyn ElevationSource>>> {
    if let Some(dir) = &args.elevation_dir {
        return Ok(Some(Arc::new(DirectorySource::new(dir))));
    }
    match &args.elevation_url {
        Some(url) => remote_source(url),
        None => Ok(None),
    }
}

#[cfg(feature = "http-source")]
fn remote_source(url: &str) -> Result<Option<Arc<dyn ElevationSource>>> {
    Ok(Some(Arc::new(sar_core::tiles::HttpSource::new(url))))
}

#[cfg(not(feature = "http-source"))]
fn remote_source(url: &str) -> Result<Option<Arc<dyn ElevationSource>>> {
    anyhow::bail!("--elevation-url {url} requires building with --features http-source")
}
