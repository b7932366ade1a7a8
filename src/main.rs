use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use event_aggregator::aggregator::Aggregator;
use event_aggregator::cache::InMemoryCache;
use event_aggregator::config::Config;
use event_aggregator::logging;
use event_aggregator::providers::enabled_providers;
use event_aggregator::query::RawQueryParams;
use event_aggregator::server::{create_server, init_metrics};

#[derive(Parser)]
#[command(name = "event-aggregator")]
#[command(about = "Multi-provider event search aggregation engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP search server
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one search from the command line and print the JSON response
    Search {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        lat: Option<String>,
        #[arg(long)]
        lng: Option<String>,
        #[arg(long)]
        radius: Option<String>,
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        /// Comma-separated category filter
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        limit: Option<String>,
        /// Skip the result cache for this call
        #[arg(long)]
        force_refresh: bool,
    },
}

fn build_aggregator(config: &Config) -> Aggregator {
    let providers = enabled_providers(config);
    Aggregator::new(config, providers, Arc::new(InMemoryCache::new()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    let metrics_handle = init_metrics()?;

    match cli.command {
        Commands::Serve { port } => {
            let aggregator = Arc::new(build_aggregator(&config));
            let app = create_server(aggregator, metrics_handle);
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            info!("Listening on {}", addr);
            axum::Server::bind(&addr)
                .serve(app.into_make_service())
                .await?;
        }
        Commands::Search {
            keyword,
            lat,
            lng,
            radius,
            start_date,
            end_date,
            category,
            sort,
            limit,
            force_refresh,
        } => {
            let aggregator = build_aggregator(&config);
            let params = RawQueryParams {
                keyword,
                lat,
                lng,
                radius,
                start_date,
                end_date,
                category,
                min_price: None,
                max_price: None,
                limit,
                offset: None,
                sort,
                force_refresh: force_refresh.then(|| "true".to_string()),
            };
            let response = aggregator.search_raw(&params).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
