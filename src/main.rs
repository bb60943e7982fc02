//! regwatch - look up UK vehicle registrations through a cached, rate-limited gateway
//!
//! Wires the gateway together from environment credentials and CLI
//! arguments, runs a single lookup, and prints the result.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use regwatch::cache::{CacheStore, RecordCache};
use regwatch::cli::Cli;
use regwatch::config::{ConfigError, MotCredentials, VesCredentials};
use regwatch::data::{MotClient, VesClient};
use regwatch::gateway::{Gateway, VehicleReport};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("regwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (ves, mot) = match load_credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cache = if cli.no_store {
        RecordCache::new()
    } else {
        match CacheStore::new() {
            Some(store) => RecordCache::with_store(store),
            None => {
                tracing::warn!("cache directory unavailable; running without persistence");
                RecordCache::new()
            }
        }
    };

    let gateway = Gateway::with_cache(
        VesClient::new(ves.api_key),
        MotClient::new(mot),
        cli.gateway_config(),
        cache,
    );

    match gateway.lookup(&cli.identity, &cli.registration).await {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error: failed to encode report: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_summary(&report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads credentials for both upstream services from the environment
fn load_credentials() -> Result<(VesCredentials, MotCredentials), ConfigError> {
    Ok((VesCredentials::from_env()?, MotCredentials::from_env()?))
}

/// Prints a readable summary of a lookup report
fn print_summary(report: &VehicleReport) {
    let record = &report.record;

    println!("Registration:      {}", record.registration_number);
    print_field("Make", record.make.as_deref());
    print_field("Model", record.model.as_deref());
    print_field("Colour", record.primary_colour.as_deref());
    print_field("Fuel type", record.fuel_type.as_deref());
    print_field(
        "Engine size",
        record.engine_size.map(|v| v.to_string()).as_deref(),
    );
    print_field(
        "CO2 emissions",
        record.co2_emissions.map(|v| v.to_string()).as_deref(),
    );
    print_field(
        "Year",
        record.year_of_manufacture.map(|v| v.to_string()).as_deref(),
    );
    print_field("First used", record.first_used_date.as_deref());
    print_field("Tax status", record.tax_status.as_deref());
    print_field("Tax due", record.tax_due_date.as_deref());
    print_field("MOT status", record.mot_status.as_deref());
    print_field("MOT expiry", record.mot_expiry_date.as_deref());
    println!("Lookups served:    {}", report.request_count);

    if !record.mot_tests.is_empty() {
        println!("MOT tests:");
        for test in &record.mot_tests {
            let odometer = match (&test.odometer_value, &test.odometer_unit) {
                (Some(value), Some(unit)) => format!("{value} {unit}"),
                (Some(value), None) => value.clone(),
                _ => "-".to_string(),
            };
            println!(
                "  {}  {}  odometer {}",
                test.completed_date, test.test_result, odometer
            );
        }
    }

    if report.partial {
        println!("Note: test history was unavailable for this lookup.");
    }
    if report.degraded {
        println!("Note: served from cache; the data sources are currently unavailable.");
    }
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("{:<18} {}", format!("{label}:"), value);
    }
}
