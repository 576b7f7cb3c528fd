//! # jangteo
//!
//! One HTTP API over three Korean second-hand marketplaces. Joongna and
//! Bunjang are read through their JSON backends, Daangn through its public
//! search pages; a combined endpoint fans a keyword out to all three and
//! merges the results newest-first.

mod aggregator;
mod cli;
mod error;
mod fanout;
mod models;
mod regions;
mod scrapers;
mod server;
mod throttle;
mod timestamp;

use crate::aggregator::Aggregator;
use crate::cli::Cli;
use crate::regions::RegionCache;
use crate::scrapers::bunjang::BunjangClient;
use crate::scrapers::daangn::DaangnClient;
use crate::scrapers::joongna::JoongnaClient;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use tracing_subscriber::fmt as tfmt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();

    let cli = Cli::parse();
    let interval = Duration::from_millis(cli.request_interval_ms);

    let joongna = Arc::new(JoongnaClient::new(interval)?);
    let bunjang = Arc::new(BunjangClient::new(interval)?);
    let regions = Arc::new(RegionCache::new(Duration::from_secs(cli.region_ttl_secs))?);
    let daangn = Arc::new(DaangnClient::new(interval, Arc::clone(&regions))?);
    let aggregator = Aggregator::new(
        Arc::clone(&joongna),
        Arc::clone(&bunjang),
        Arc::clone(&daangn),
    );

    let state = Arc::new(server::AppState {
        joongna,
        bunjang,
        daangn,
        regions,
        aggregator,
    });
    let router = server::router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
