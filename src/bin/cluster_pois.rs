//! Offline K-means clustering of scraped OSM POIs.
//!
//! Reads a GeoJSON FeatureCollection, assigns each feature a coarse
//! category and a cluster, and writes the result as CSV.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lakbai_api::services::clustering::cluster_geojson;

#[derive(Parser, Debug)]
#[command(name = "cluster_pois", about = "Cluster OSM POIs with K-means")]
struct Args {
    /// GeoJSON FeatureCollection exported from OSM
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "clustered_pois.csv")]
    output: PathBuf,

    /// Number of clusters
    #[arg(short, default_value_t = 8)]
    k: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let pois = cluster_geojson(&raw, args.k)?;

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for poi in &pois {
        writer.serialize(poi)?;
    }
    writer.flush()?;

    tracing::info!(
        pois = pois.len(),
        k = args.k,
        output = %args.output.display(),
        "Clustered POIs"
    );
    Ok(())
}
