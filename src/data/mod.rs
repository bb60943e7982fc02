//! Core data models for regwatch
//!
//! This module contains the vehicle data types shared between the upstream
//! clients, the record cache, and the gateway, plus registration-number
//! normalization.

pub mod mot;
pub mod ves;

pub use mot::{MotClient, MotError};
pub use ves::{VesClient, VesError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a raw registration number
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The input was empty after removing whitespace
    #[error("Registration number is required")]
    Empty,

    /// The input contained a character outside A-Z/0-9
    #[error("Registration number contains invalid character: '{0}'")]
    InvalidCharacter(char),

    /// The input was longer than any valid UK plate
    #[error("Registration number is too long: {0} characters")]
    TooLong(usize),
}

/// A normalized vehicle registration number
///
/// Normalization uppercases the input and strips all whitespace, so two
/// semantically equal raw inputs (e.g. `"ab12 cde"` and `"AB12CDE"`) always
/// produce the same key for cache and rate-limit purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration(String);

/// Longest plate accepted after normalization (standard UK formats top out
/// at seven characters; eight leaves room for trade plates)
const MAX_REGISTRATION_LEN: usize = 8;

impl Registration {
    /// Parses and normalizes a raw registration string
    ///
    /// # Arguments
    /// * `raw` - The registration as supplied by the caller
    ///
    /// # Returns
    /// * `Ok(Registration)` with the normalized form
    /// * `Err(RegistrationError)` if the input is empty, too long, or
    ///   contains non-alphanumeric characters
    pub fn parse(raw: &str) -> Result<Self, RegistrationError> {
        let mut normalized = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_whitespace() {
                continue;
            }
            if !ch.is_ascii_alphanumeric() {
                return Err(RegistrationError::InvalidCharacter(ch));
            }
            normalized.push(ch.to_ascii_uppercase());
        }

        if normalized.is_empty() {
            return Err(RegistrationError::Empty);
        }
        if normalized.len() > MAX_REGISTRATION_LEN {
            return Err(RegistrationError::TooLong(normalized.len()));
        }

        Ok(Self(normalized))
    }

    /// The normalized registration string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed failure of one upstream source, classified at the client boundary
///
/// Raw transport errors never cross this boundary; the gateway only sees
/// these kinds when deciding how to merge or degrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source has no record of the vehicle
    #[error("Vehicle not found")]
    NotFound,

    /// The source itself throttled the request
    #[error("Upstream rate limit exceeded")]
    RateLimitedUpstream,

    /// The source failed or returned an unusable response
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete within its deadline
    #[error("Upstream request timed out")]
    Timeout,
}

/// Vehicle attributes from the primary registry (DVLA VES)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryFields {
    pub make: Option<String>,
    pub colour: Option<String>,
    pub fuel_type: Option<String>,
    pub engine_capacity: Option<u32>,
    pub co2_emissions: Option<u32>,
    pub year_of_manufacture: Option<i32>,
    pub month_of_first_registration: Option<String>,
    pub tax_status: Option<String>,
    pub tax_due_date: Option<String>,
    pub mot_status: Option<String>,
    pub mot_expiry_date: Option<String>,
}

/// Vehicle attributes and test records from the history service (DVSA MOT)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFields {
    pub make: Option<String>,
    pub model: Option<String>,
    pub first_used_date: Option<String>,
    pub fuel_type: Option<String>,
    pub primary_colour: Option<String>,
    pub registration_date: Option<String>,
    pub manufacture_date: Option<String>,
    pub engine_size: Option<u32>,
    pub mot_tests: Vec<MotTest>,
}

/// A single MOT test record, newest first in [`HistoryFields::mot_tests`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotTest {
    /// When the test was completed
    pub completed_date: String,
    /// PASSED or FAILED
    pub test_result: String,
    /// Expiry of the certificate issued by this test, if it passed
    pub expiry_date: Option<String>,
    /// Odometer reading at test time
    pub odometer_value: Option<String>,
    /// Unit of the odometer reading (mi/km)
    pub odometer_unit: Option<String>,
    /// DVSA test number
    pub mot_test_number: Option<String>,
}

/// The merged vehicle record held in the cache and returned to callers
///
/// Field presence reflects what the sources supplied: a record persisted
/// from a partial fetch has its history-derived fields absent and an empty
/// test list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub registration_number: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub primary_colour: Option<String>,
    pub fuel_type: Option<String>,
    pub engine_size: Option<u32>,
    pub co2_emissions: Option<u32>,
    pub year_of_manufacture: Option<i32>,
    pub first_used_date: Option<String>,
    pub registration_date: Option<String>,
    pub manufacture_date: Option<String>,
    pub tax_status: Option<String>,
    pub tax_due_date: Option<String>,
    pub mot_status: Option<String>,
    pub mot_expiry_date: Option<String>,
    pub mot_tests: Vec<MotTest>,
}
