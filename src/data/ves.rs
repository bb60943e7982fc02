//! DVLA Vehicle Enquiry Service client
//!
//! The primary registry for vehicle attributes. Lookups are POST requests
//! authenticated with an API key; the service is authoritative for whether a
//! registration exists at all.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::{PrimaryFields, SourceError};
use crate::gateway::PrimarySource;

/// Base URL for the Vehicle Enquiry Service API
const VES_BASE_URL: &str = "https://driver-vehicle-licensing.api.gov.uk";

/// Errors that can occur when fetching registry data
#[derive(Debug, Error)]
pub enum VesError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The registry has no record for the registration
    #[error("Vehicle not found in the registry")]
    NotFound,

    /// The registry rejected the registration format
    #[error("Registry rejected the registration number")]
    BadRequest,

    /// The registry throttled the request
    #[error("Registry rate limit exceeded")]
    Throttled,

    /// Any other non-success status
    #[error("Registry returned status {0}")]
    Status(u16),
}

impl From<VesError> for SourceError {
    fn from(err: VesError) -> Self {
        match err {
            VesError::NotFound => SourceError::NotFound,
            VesError::Throttled => SourceError::RateLimitedUpstream,
            // A rejected format at this layer means the registry cannot
            // resolve the vehicle, which callers treat like a miss.
            VesError::BadRequest => SourceError::NotFound,
            VesError::RequestFailed(e) if e.is_timeout() => SourceError::Timeout,
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

/// Client for the DVLA Vehicle Enquiry Service
#[derive(Debug, Clone)]
pub struct VesClient {
    /// HTTP client for making requests
    http_client: Client,
    /// API key sent in the `x-api-key` header
    api_key: String,
    /// Base URL for the API
    base_url: String,
}

impl VesClient {
    /// Creates a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: VES_BASE_URL.to_string(),
        }
    }

    /// Fetches registry attributes for a normalized registration number
    ///
    /// # Arguments
    /// * `registration` - The normalized registration to look up
    ///
    /// # Returns
    /// * `Ok(PrimaryFields)` - Registry attributes for the vehicle
    /// * `Err(VesError)` - If the request fails or the status is non-success
    pub async fn fetch_vehicle(&self, registration: &str) -> Result<PrimaryFields, VesError> {
        let url = format!("{}/vehicle-enquiry/v1/vehicles", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({ "registrationNumber": registration }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: VesResponse = response.json().await?;
                Ok(body.into())
            }
            StatusCode::NOT_FOUND => Err(VesError::NotFound),
            StatusCode::BAD_REQUEST => Err(VesError::BadRequest),
            StatusCode::TOO_MANY_REQUESTS => Err(VesError::Throttled),
            other => Err(VesError::Status(other.as_u16())),
        }
    }
}

#[async_trait]
impl PrimarySource for VesClient {
    async fn fetch_primary(&self, registration: &str) -> Result<PrimaryFields, SourceError> {
        self.fetch_vehicle(registration).await.map_err(Into::into)
    }
}

/// Vehicle Enquiry Service response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VesResponse {
    #[allow(dead_code)]
    registration_number: Option<String>,
    make: Option<String>,
    colour: Option<String>,
    fuel_type: Option<String>,
    engine_capacity: Option<u32>,
    co2_emissions: Option<u32>,
    year_of_manufacture: Option<i32>,
    month_of_first_registration: Option<String>,
    tax_status: Option<String>,
    tax_due_date: Option<String>,
    mot_status: Option<String>,
    mot_expiry_date: Option<String>,
}

impl From<VesResponse> for PrimaryFields {
    fn from(body: VesResponse) -> Self {
        Self {
            make: body.make,
            colour: body.colour,
            fuel_type: body.fuel_type,
            engine_capacity: body.engine_capacity,
            co2_emissions: body.co2_emissions,
            year_of_manufacture: body.year_of_manufacture,
            month_of_first_registration: body.month_of_first_registration,
            tax_status: body.tax_status,
            tax_due_date: body.tax_due_date,
            mot_status: body.mot_status,
            mot_expiry_date: body.mot_expiry_date,
        }
    }
}
