//! regwatch library
//!
//! A request gateway for UK vehicle registration lookups. The gateway fronts
//! two external providers - the DVLA Vehicle Enquiry Service and the DVSA
//! MOT History API - with per-identity sliding-window rate limiting, a
//! staleness-aware record cache, and merge logic that tolerates one of the
//! two sources failing.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod limiter;

pub use gateway::{Gateway, LookupError, VehicleReport};
