use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use geoagg::aggregations::{parse_descriptor, AggregationsRequest};
use geoagg::collection::CollectionReference;
use geoagg::config::Config;
use geoagg::filter::Filter;
use geoagg::geo::{self, geohash, Tile};
use serde_json::json;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "geoagg")]
#[command(about = "geoagg CLI - aggregation descriptor and geo-tile tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse descriptors and print their normalised form
    Parse {
        /// Aggregation descriptors, outermost first
        #[arg(required = true)]
        descriptors: Vec<String>,
    },

    /// Print the engine request compiled for a collection
    Compile {
        /// Configuration file declaring the collection
        #[arg(short, long, default_value = "geoagg.toml")]
        config: String,

        /// Collection name
        #[arg(long)]
        collection: String,

        /// Aggregation descriptors, outermost first
        #[arg(long = "agg", required = true)]
        aggs: Vec<String>,

        /// Expression filters (field:op:value)
        #[arg(long = "f")]
        filters: Vec<String>,

        /// Full-text queries
        #[arg(long = "q")]
        queries: Vec<String>,

        /// Point-within bounding boxes (west,south,east,north)
        #[arg(long)]
        pwithin: Vec<String>,
    },

    /// Show a tile's bounding box and default geohash descriptor
    Tile {
        z: u32,
        x: u32,
        y: u32,

        /// Centroid path used in the default descriptor
        #[arg(long, default_value = "centroid")]
        centroid: String,
    },

    /// Show a geohash cell and its default descriptor
    Geohash {
        hash: String,

        /// Centroid path used in the default descriptor
        #[arg(long, default_value = "centroid")]
        centroid: String,
    },
}

fn find_collection(config_path: &str, name: &str) -> Result<CollectionReference> {
    let config = Config::load(Path::new(config_path))?;
    config
        .collections
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| anyhow!("collection '{}' is not declared in {}", name, config_path))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { descriptors } => {
            let nodes = descriptors
                .iter()
                .map(|d| {
                    let agg = parse_descriptor(d)?;
                    Ok(json!({ "descriptor": agg.to_string(), "aggregation": agg }))
                })
                .collect::<geoagg::Result<Vec<_>>>()?;
            print_json(&json!(nodes))?;
        }
        Commands::Compile {
            config,
            collection,
            aggs,
            filters,
            queries,
            pwithin,
        } => {
            let collection = find_collection(&config, &collection)?;
            let filter = Filter {
                f: filters,
                q: queries,
                pwithin,
                ..Default::default()
            };
            let request = AggregationsRequest::from_descriptors(filter, &aggs, &collection)?;
            let compiled = geoagg::service::compile(&collection, &request, None)?;
            tracing::info!(index = %collection.index, "Compiled request");
            print_json(&json!({ "index": collection.index, "body": compiled }))?;
        }
        Commands::Tile { z, x, y, centroid } => {
            let tile = Tile::new(x, y, z)?;
            let bbox = tile.bbox();
            print_json(&json!({
                "tile": tile,
                "bbox": bbox.to_string(),
                "precision": tile.default_precision(),
                "descriptor": geo::default_geohash_descriptor(&centroid, tile.default_precision()),
            }))?;
        }
        Commands::Geohash { hash, centroid } => {
            let bbox = geohash::decode_bbox(&hash)?;
            let precision = hash.trim_start_matches('#').len();
            print_json(&json!({
                "geohash": hash,
                "bbox": bbox.to_string(),
                "center": bbox.center(),
                "descriptor": geo::default_geohash_descriptor(&centroid, precision),
            }))?;
        }
    }

    Ok(())
}
