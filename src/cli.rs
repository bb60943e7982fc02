//! Command-line interface parsing for regwatch
//!
//! One lookup per invocation: the registration is a positional argument and
//! the remaining flags tune output format, the rate-limit identity, and the
//! cache staleness threshold.

use clap::Parser;
use std::time::Duration;

use crate::config::{GatewayConfig, DEFAULT_MAX_RECORD_AGE_HOURS};

/// regwatch - look up UK vehicle registrations through a cached, rate-limited gateway
#[derive(Parser, Debug)]
#[command(name = "regwatch")]
#[command(about = "UK vehicle registration lookups with caching and rate limiting")]
#[command(version)]
pub struct Cli {
    /// Registration number to look up (e.g. "AB12 CDE")
    pub registration: String,

    /// Emit the raw JSON report instead of a readable summary
    #[arg(long)]
    pub json: bool,

    /// Identity used for rate limiting
    ///
    /// Defaults to "local" for interactive use; a fronting proxy passes the
    /// resolved client address here.
    #[arg(long, default_value = "local")]
    pub identity: String,

    /// Hours a cached record stays fresh before it is refreshed
    #[arg(long, value_name = "HOURS", default_value_t = DEFAULT_MAX_RECORD_AGE_HOURS)]
    pub max_age_hours: u64,

    /// Skip the persistent on-disk cache for this invocation
    #[arg(long)]
    pub no_store: bool,
}

impl Cli {
    /// Builds the gateway configuration implied by the arguments
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_record_age: Duration::from_secs(self.max_age_hours * 3600),
            ..GatewayConfig::default()
        }
    }
}
