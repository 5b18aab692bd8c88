#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for pgb
//!
//! This crate holds the HTTP client (connection pooling, retries) and the
//! PhoneGap Build implementation of the build service: workspace upload,
//! key unlocking, status polling and artifact download.

pub mod archive;
mod client;
mod service;

pub use client::{check_status, NetClient, NetConfig, DEFAULT_RETRY_AFTER_SECS};
pub use service::{PgbService, PgbSession, ServiceOptions};

use pgb_config::Config;
use pgb_errors::{Error, NetworkError};
use url::Url;

/// Build a service from the loaded configuration
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be created or the configured
/// base URL is invalid.
pub fn service_from_config(config: &Config) -> Result<PgbService, Error> {
    let client = NetClient::new(NetConfig::from(&config.network))?;
    PgbService::new(client, ServiceOptions::from(config))
}

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed or invalid according to RFC 3986.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}
