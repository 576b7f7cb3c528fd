//! Command line and environment configuration.

use clap::Parser;

/// Second-hand listing search API over 중고나라, 번개장터 and 당근.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, env = "JANGTEO_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[arg(long, env = "JANGTEO_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Minimum delay between consecutive requests to the same marketplace,
    /// in milliseconds.
    #[arg(long, env = "JANGTEO_REQUEST_INTERVAL_MS", default_value_t = 500)]
    pub request_interval_ms: u64,

    /// Lifetime of the cached 당근 region directory, in seconds.
    #[arg(long, env = "JANGTEO_REGION_TTL_SECS", default_value_t = 3600)]
    pub region_ttl_secs: u64,
}
