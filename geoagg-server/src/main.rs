use anyhow::{anyhow, Result};
use clap::Parser;
use geoagg::collection::StaticCatalog;
use geoagg::config::{BackendKind, Config};
use geoagg::engine::{AggregationBackend, ElasticsearchBackend, MemoryBackend};
use geoagg::ExploreService;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "geoagg-server")]
#[command(about = "Aggregation and geo-aggregation server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "geoagg.toml", env = "GEOAGG_CONFIG")]
    config: String,

    /// Host to bind to (overrides server.bind_addr)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.bind_addr)
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
    );
    let json = std::env::var("LOG_FORMAT")
        .map(|f| f == "json")
        .unwrap_or(config.logging.format == "json");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn bind_addr(config: &Config, args: &Args) -> String {
    let (default_host, default_port) = config
        .server
        .bind_addr
        .rsplit_once(':')
        .unwrap_or((config.server.bind_addr.as_str(), "9999"));
    let host = args.host.as_deref().unwrap_or(default_host);
    match args.port {
        Some(port) => format!("{}:{}", host, port),
        None => format!("{}:{}", host, default_port),
    }
}

fn build_backend(config: &Config) -> Result<Arc<dyn AggregationBackend>> {
    match config.backend.kind {
        BackendKind::Elasticsearch => {
            tracing::info!("Using Elasticsearch backend at {}", config.backend.url);
            Ok(Arc::new(ElasticsearchBackend::new(
                &config.backend.url,
                config.backend.timeout(),
            )?))
        }
        BackendKind::Memory => {
            let backend = MemoryBackend::new();
            if let Some(path) = &config.backend.memory_data {
                let docs = MemoryBackend::read_jsonl(path)?;
                tracing::info!("Loaded {} documents from {}", docs.len(), path.display());
                let indices: BTreeSet<&str> =
                    config.collections.iter().map(|c| c.index.as_str()).collect();
                for index in indices {
                    backend.insert(index, docs.iter().cloned());
                }
            } else {
                tracing::warn!("Memory backend without memory_data, no index is loaded");
            }
            Ok(Arc::new(backend))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config
    let config = Config::load_or_create(Path::new(&args.config))?;
    init_tracing(&config);

    tracing::info!("Config file: {}", args.config);

    if let Some(metrics_addr) = &config.observability.metrics_addr {
        let addr: std::net::SocketAddr = metrics_addr
            .parse()
            .map_err(|e| anyhow!("Invalid observability.metrics_addr '{}': {}", metrics_addr, e))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let backend = build_backend(&config)?;
    let catalog = Arc::new(StaticCatalog::new(config.collections.clone()));
    tracing::info!("Serving {} collections", config.collections.len());

    let service = Arc::new(ExploreService::new(
        catalog,
        backend,
        config.backend.timeout(),
    ));

    let addr = bind_addr(&config, &args);
    tracing::info!("Starting geoagg server on {}", addr);

    let server = geoagg::api::ApiServer::with_cors(service, config.server.cors.clone())?;
    server.serve(&addr).await?;

    Ok(())
}
