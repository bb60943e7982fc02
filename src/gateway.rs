//! Lookup gateway orchestrating rate limiting, caching, and upstream fetches
//!
//! One lookup runs a fixed decision sequence: normalize the registration,
//! ask the rate limiter for admission, serve a fresh cache hit, and only
//! otherwise fetch both upstream sources concurrently, merge what came back,
//! and write the result through the cache. Partial failure is tolerated
//! asymmetrically: a failed history fetch yields a partial success, while a
//! failed primary fetch fails the lookup, because the primary registry is
//! authoritative for whether the vehicle exists at all.

use async_trait::async_trait;
use chrono::Utc;
use futures::join;
use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheError, RecordCache};
use crate::config::GatewayConfig;
use crate::data::{
    HistoryFields, PrimaryFields, Registration, RegistrationError, SourceError, VehicleRecord,
};
use crate::limiter::RateLimiter;

/// The primary vehicle registry, authoritative for vehicle existence
#[async_trait]
pub trait PrimarySource: Send + Sync {
    /// Fetches registry attributes for a normalized registration
    async fn fetch_primary(&self, registration: &str) -> Result<PrimaryFields, SourceError>;
}

/// The test-history service
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetches MOT history for a normalized registration
    async fn fetch_history(&self, registration: &str) -> Result<HistoryFields, SourceError>;
}

/// Errors surfaced to the caller of [`Gateway::lookup`]
///
/// Upstream transport errors never appear here raw; they are classified into
/// these kinds at the gateway boundary. No retries happen inside the
/// gateway; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The raw input did not normalize to a valid registration (not retryable)
    #[error("{0}")]
    InvalidRegistration(#[from] RegistrationError),

    /// The identity exceeded its admission window (retryable after the window)
    #[error("Rate limit exceeded: {limit} requests per {window_secs} seconds")]
    RateLimited {
        /// The configured per-window limit
        limit: usize,
        /// The configured window length in seconds
        window_secs: u64,
    },

    /// The primary registry failed, so the vehicle cannot be verified
    #[error("Vehicle lookup failed: {0}")]
    VehicleLookupFailed(SourceError),

    /// Both sources failed and no cached record exists to fall back on
    #[error("Vehicle data sources are unavailable")]
    UpstreamUnavailable,

    /// Internal cache inconsistency
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The composed result of one lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleReport {
    /// The merged vehicle record
    #[serde(flatten)]
    pub record: VehicleRecord,
    /// How many lookups have been served for this registration so far
    pub request_count: u64,
    /// True when the record came from the history source failing mid-merge;
    /// history-derived fields are absent
    pub partial: bool,
    /// True when the record is a stale cached copy served because both
    /// sources were down
    pub degraded: bool,
}

/// The lookup gateway
///
/// Owns the rate limiter and record cache for its lifetime; constructed once
/// at startup and shared by reference across concurrent lookups. Upstream
/// sources are injected through the [`PrimarySource`]/[`HistorySource`]
/// traits so tests can substitute instrumented doubles.
pub struct Gateway<P, H> {
    limiter: RateLimiter,
    cache: RecordCache,
    primary: P,
    history: H,
    config: GatewayConfig,
}

impl<P: PrimarySource, H: HistorySource> Gateway<P, H> {
    /// Creates a gateway with a fresh in-memory cache
    pub fn new(primary: P, history: H, config: GatewayConfig) -> Self {
        Self::with_cache(primary, history, config, RecordCache::new())
    }

    /// Creates a gateway over an existing cache (e.g. one backed by disk)
    pub fn with_cache(primary: P, history: H, config: GatewayConfig, cache: RecordCache) -> Self {
        let limiter = RateLimiter::new(config.max_requests, config.window);
        Self {
            limiter,
            cache,
            primary,
            history,
            config,
        }
    }

    /// Looks up a vehicle for the given caller identity
    ///
    /// # Arguments
    /// * `identity` - Pre-resolved rate-limiting identity (typically the
    ///   client address); the gateway does not parse headers itself
    /// * `raw_registration` - The registration as supplied by the caller
    ///
    /// # Returns
    /// * `Ok(VehicleReport)` - Merged record with its request count; check
    ///   the `partial`/`degraded` flags for incomplete or stale results
    /// * `Err(LookupError)` - One of the classified failure kinds
    pub async fn lookup(
        &self,
        identity: &str,
        raw_registration: &str,
    ) -> Result<VehicleReport, LookupError> {
        let registration = Registration::parse(raw_registration)?;

        if !self.limiter.admit(identity) {
            debug!(identity, %registration, "lookup denied by rate limiter");
            return Err(LookupError::RateLimited {
                limit: self.limiter.max_requests(),
                window_secs: self.limiter.window().as_secs(),
            });
        }

        let key = registration.as_str();
        let cached = self.cache.lookup(key);
        if let Some(entry) = &cached {
            if self.is_fresh(entry) {
                debug!(%registration, "serving fresh cache hit");
                let entry = self.cache.touch(key)?;
                return Ok(Self::report(entry, false, false));
            }
        }

        debug!(%registration, stale = cached.is_some(), "fetching from upstream sources");
        let deadline = self.config.upstream_timeout;
        let (primary_res, history_res) = join!(
            timeout(deadline, self.primary.fetch_primary(key)),
            timeout(deadline, self.history.fetch_history(key)),
        );
        // An elapsed deadline counts as that upstream failing.
        let primary_res = primary_res.unwrap_or(Err(SourceError::Timeout));
        let history_res = history_res.unwrap_or(Err(SourceError::Timeout));

        match (primary_res, history_res) {
            (Ok(primary), Ok(history)) => {
                let record = merge_sources(&registration, primary, Some(history));
                let entry = self.cache.upsert(key, record);
                Ok(Self::report(entry, false, false))
            }
            (Ok(primary), Err(history_err)) => {
                warn!(%registration, error = %history_err, "history source failed; serving partial record");
                let record = merge_sources(&registration, primary, None);
                let entry = self.cache.upsert(key, record);
                Ok(Self::report(entry, true, false))
            }
            (Err(primary_err), Ok(_)) => {
                warn!(%registration, error = %primary_err, "primary registry failed");
                Err(LookupError::VehicleLookupFailed(primary_err))
            }
            (Err(primary_err), Err(history_err)) => {
                if cached.is_some() {
                    warn!(
                        %registration,
                        primary_error = %primary_err,
                        history_error = %history_err,
                        "both sources failed; serving stale cached record"
                    );
                    let entry = self.cache.touch(key)?;
                    Ok(Self::report(entry, false, true))
                } else {
                    warn!(
                        %registration,
                        primary_error = %primary_err,
                        history_error = %history_err,
                        "both sources failed with no cached fallback"
                    );
                    Err(LookupError::UpstreamUnavailable)
                }
            }
        }
    }

    /// Whether a cached entry is young enough to serve without a refresh
    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.last_updated);
        match age.to_std() {
            Ok(age) => age < self.config.max_record_age,
            // A future timestamp (clock adjustment) counts as fresh.
            Err(_) => true,
        }
    }

    fn report(entry: CacheEntry, partial: bool, degraded: bool) -> VehicleReport {
        VehicleReport {
            record: entry.record,
            request_count: entry.request_count,
            partial,
            degraded,
        }
    }
}

/// Merges the two source payloads into one record
///
/// Primary registry fields form the base. The model, first-used date, and
/// the test list only exist on the history side; for overlapping fields the
/// history value wins when present and the primary value is kept otherwise.
/// MOT expiry prefers the newest test's expiry date.
fn merge_sources(
    registration: &Registration,
    primary: PrimaryFields,
    history: Option<HistoryFields>,
) -> VehicleRecord {
    let history = history.unwrap_or_default();
    // Tests arrive newest first; the first expiry is the current one.
    let latest_expiry = history
        .mot_tests
        .iter()
        .find_map(|test| test.expiry_date.clone());

    VehicleRecord {
        registration_number: registration.as_str().to_string(),
        make: history.make.or(primary.make),
        model: history.model,
        primary_colour: history.primary_colour.or(primary.colour),
        fuel_type: history.fuel_type.or(primary.fuel_type),
        engine_size: history.engine_size.or(primary.engine_capacity),
        co2_emissions: primary.co2_emissions,
        year_of_manufacture: primary.year_of_manufacture,
        first_used_date: history.first_used_date,
        registration_date: history
            .registration_date
            .or(primary.month_of_first_registration),
        manufacture_date: history.manufacture_date,
        tax_status: primary.tax_status,
        tax_due_date: primary.tax_due_date,
        mot_status: primary.mot_status,
        mot_expiry_date: latest_expiry.or(primary.mot_expiry_date),
        mot_tests: history.mot_tests,
    }
}
