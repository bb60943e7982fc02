//! DVSA MOT History API client
//!
//! The history service for MOT test records and inspection status. Requests
//! carry an OAuth2 client-credentials bearer token plus an API key; the token
//! is cached in the client until shortly before it expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{HistoryFields, MotTest, SourceError};
use crate::config::MotCredentials;
use crate::gateway::HistorySource;

/// OAuth2 scope required by the MOT trade API
const MOT_TOKEN_SCOPE: &str = "https://tapi.dvsa.gov.uk/.default";

/// Safety margin subtracted from a token's lifetime before it is refreshed
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors that can occur when fetching MOT history
#[derive(Debug, Error)]
pub enum MotError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The token endpoint refused the client credentials
    #[error("Token endpoint returned status {0}")]
    TokenRejected(u16),

    /// The history service has no record for the registration
    #[error("No MOT history for this vehicle")]
    NotFound,

    /// The history service throttled the request
    #[error("MOT history rate limit exceeded")]
    Throttled,

    /// Any other non-success status
    #[error("MOT history service returned status {0}")]
    Status(u16),
}

impl From<MotError> for SourceError {
    fn from(err: MotError) -> Self {
        match err {
            MotError::NotFound => SourceError::NotFound,
            MotError::Throttled => SourceError::RateLimitedUpstream,
            MotError::RequestFailed(e) if e.is_timeout() => SourceError::Timeout,
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

/// A bearer token with its refresh deadline
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Whether the token is still safely usable at `now`
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Client for the DVSA MOT History trade API
#[derive(Debug)]
pub struct MotClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Credentials and endpoints for the API
    credentials: MotCredentials,
    /// Cached bearer token, refreshed lazily on expiry
    token: Mutex<Option<CachedToken>>,
}

impl MotClient {
    /// Creates a new client from the configured credentials
    pub fn new(credentials: MotCredentials) -> Self {
        Self {
            http_client: Client::new(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Returns a usable bearer token, fetching a fresh one if needed
    async fn access_token(&self) -> Result<String, MotError> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let response = self
            .http_client
            .post(&self.credentials.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", MOT_TOKEN_SCOPE),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MotError::TokenRejected(response.status().as_u16()));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::seconds(body.expires_in.unwrap_or(3600));
        let cached = CachedToken {
            access_token: body.access_token,
            expires_at: Utc::now() + lifetime,
        };
        let token = cached.access_token.clone();
        *slot = Some(cached);
        Ok(token)
    }

    /// Fetches MOT history for a normalized registration number
    ///
    /// # Arguments
    /// * `registration` - The normalized registration to look up
    ///
    /// # Returns
    /// * `Ok(HistoryFields)` - Test records and inspection attributes
    /// * `Err(MotError)` - If token acquisition or the lookup fails
    pub async fn fetch_tests(&self, registration: &str) -> Result<HistoryFields, MotError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v1/trade/vehicles/registration/{}",
            self.credentials.base_url, registration
        );
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("X-API-Key", &self.credentials.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: MotResponse = response.json().await?;
                Ok(body.into())
            }
            StatusCode::NOT_FOUND => Err(MotError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(MotError::Throttled),
            other => Err(MotError::Status(other.as_u16())),
        }
    }
}

#[async_trait]
impl HistorySource for MotClient {
    async fn fetch_history(&self, registration: &str) -> Result<HistoryFields, SourceError> {
        self.fetch_tests(registration).await.map_err(Into::into)
    }
}

/// OAuth2 token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// MOT History API response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MotResponse {
    #[allow(dead_code)]
    registration: Option<String>,
    make: Option<String>,
    model: Option<String>,
    first_used_date: Option<String>,
    fuel_type: Option<String>,
    primary_colour: Option<String>,
    registration_date: Option<String>,
    manufacture_date: Option<String>,
    engine_size: Option<String>,
    #[serde(default)]
    mot_tests: Vec<MotTestRecord>,
}

/// A single test entry in the MOT History response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MotTestRecord {
    completed_date: String,
    test_result: String,
    expiry_date: Option<String>,
    odometer_value: Option<String>,
    odometer_unit: Option<String>,
    mot_test_number: Option<String>,
}

impl From<MotResponse> for HistoryFields {
    fn from(body: MotResponse) -> Self {
        Self {
            make: body.make,
            model: body.model,
            first_used_date: body.first_used_date,
            fuel_type: body.fuel_type,
            primary_colour: body.primary_colour,
            registration_date: body.registration_date,
            manufacture_date: body.manufacture_date,
            engine_size: body.engine_size.and_then(|s| s.parse().ok()),
            mot_tests: body.mot_tests.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<MotTestRecord> for MotTest {
    fn from(record: MotTestRecord) -> Self {
        Self {
            completed_date: record.completed_date,
            test_result: record.test_result,
            expiry_date: record.expiry_date,
            odometer_value: record.odometer_value,
            odometer_unit: record.odometer_unit,
            mot_test_number: record.mot_test_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample MOT History API response with two tests
    const VALID_RESPONSE: &str = r#"{
        "registration": "AB12CDE",
        "make": "TOYOTA",
        "model": "COROLLA",
        "firstUsedDate": "2017.06.01",
        "fuelType": "Petrol",
        "primaryColour": "Silver",
        "registrationDate": "2017.06.01",
        "manufactureDate": "2017.05.12",
        "engineSize": "1598",
        "motTests": [
            {
                "completedDate": "2025.06.14 10:21:44",
                "testResult": "PASSED",
                "expiryDate": "2026.06.13",
                "odometerValue": "54021",
                "odometerUnit": "mi",
                "motTestNumber": "987654321012",
                "rfrAndComments": []
            },
            {
                "completedDate": "2024.06.10 09:02:31",
                "testResult": "PASSED",
                "expiryDate": "2025.06.13",
                "odometerValue": "47113",
                "odometerUnit": "mi",
                "motTestNumber": "123456789012",
                "rfrAndComments": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let body: MotResponse =
            serde_json::from_str(VALID_RESPONSE).expect("Failed to parse valid response");
        let fields = HistoryFields::from(body);

        assert_eq!(fields.make.as_deref(), Some("TOYOTA"));
        assert_eq!(fields.model.as_deref(), Some("COROLLA"));
        assert_eq!(fields.primary_colour.as_deref(), Some("Silver"));
        assert_eq!(fields.engine_size, Some(1598));
        assert_eq!(fields.mot_tests.len(), 2);
        assert_eq!(fields.mot_tests[0].test_result, "PASSED");
        assert_eq!(
            fields.mot_tests[0].expiry_date.as_deref(),
            Some("2026.06.13")
        );
        assert_eq!(
            fields.mot_tests[1].mot_test_number.as_deref(),
            Some("123456789012")
        );
    }

    #[test]
    fn test_parse_response_without_tests() {
        // Vehicles under three years old have no tests yet.
        let body: MotResponse = serde_json::from_str(
            r#"{"registration": "XY65ABC", "make": "FORD", "model": "FIESTA"}"#,
        )
        .expect("Failed to parse");
        let fields = HistoryFields::from(body);

        assert_eq!(fields.model.as_deref(), Some("FIESTA"));
        assert!(fields.mot_tests.is_empty());
    }

    #[test]
    fn test_non_numeric_engine_size_is_dropped() {
        let body: MotResponse =
            serde_json::from_str(r#"{"engineSize": "unknown"}"#).expect("Failed to parse");
        let fields = HistoryFields::from(body);
        assert!(fields.engine_size.is_none());
    }

    #[test]
    fn test_token_freshness_window() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "tok".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(token.is_fresh(now));
        // Inside the refresh margin the token counts as expired.
        assert!(!token.is_fresh(now + Duration::seconds(3541)));
        assert!(!token.is_fresh(now + Duration::seconds(7200)));
    }

    #[test]
    fn test_token_response_parse() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"token_type": "Bearer", "expires_in": 3599, "access_token": "abc123"}"#,
        )
        .expect("Failed to parse token response");
        assert_eq!(body.access_token, "abc123");
        assert_eq!(body.expires_in, Some(3599));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(SourceError::from(MotError::NotFound), SourceError::NotFound);
        assert_eq!(
            SourceError::from(MotError::Throttled),
            SourceError::RateLimitedUpstream
        );
        assert!(matches!(
            SourceError::from(MotError::TokenRejected(401)),
            SourceError::Unavailable(_)
        ));
    }
}
