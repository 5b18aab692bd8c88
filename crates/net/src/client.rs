//! HTTP client with connection pooling and retry logic

use pgb_config::NetworkConfig;
use pgb_errors::{Error, NetworkError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Wait suggested for a 429 without a usable `Retry-After` header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // uploads of large workspaces
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: format!("pgb/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&NetworkConfig> for NetConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            connect_timeout: Duration::from_secs(config.connect_timeout),
            retry_count: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay),
            ..Self::default()
        }
    }
}

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Execute a GET request with retries
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(|| self.client.get(url).send()).await
    }

    /// Execute a request built by `build` with retries
    ///
    /// The builder runs once per attempt so bodies that cannot be cloned,
    /// such as multipart forms, are rebuilt for every retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn execute<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.retry_request(|| build(&self.client).send()).await
    }

    /// Execute a request built by `build` exactly once
    ///
    /// For requests that create state on the server. A lost response may
    /// still have been applied, so these are never resent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn execute_once<F>(&self, build: F) -> Result<Response, Error>
    where
        F: FnOnce(&Client) -> RequestBuilder,
    {
        match build(&self.client).send().await {
            Ok(response) => match rate_limited(&response) {
                Some(e) => Err(e),
                None => Ok(response),
            },
            Err(e) => Err(send_error(e)),
        }
    }

    /// Execute a request with retries
    async fn retry_request<F, Fut>(&self, mut f: F) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }

            match f().await {
                Ok(response) => {
                    if let Some(e) = rate_limited(&response) {
                        return Err(e);
                    }

                    let status = response.status();
                    if status.is_server_error() && attempt < self.config.retry_count {
                        tracing::debug!(%status, attempt, "server error, retrying");
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    let retry = Self::should_retry(&e);
                    last_error = Some(e);

                    // Don't retry on certain errors
                    if !retry {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(send_error(e)),
            None => Err(NetworkError::RequestFailed("Unknown error".to_string()).into()),
        }
    }

    /// Determine if an error should be retried
    fn should_retry(error: &reqwest::Error) -> bool {
        error.is_timeout()
            || error.is_connect()
            || error.status().is_none_or(|s| s.is_server_error())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Turn a non-success response into an error
///
/// The service reports failures as `{"error": "..."}`; that message is used
/// when present.
///
/// # Errors
///
/// Returns `NetworkError::Unauthorized` for 401 and `NetworkError::HttpError`
/// for any other non-success status.
pub async fn check_status(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(NetworkError::Unauthorized.into());
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error)
        .ok()
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && trimmed.len() <= 200).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());

    Err(NetworkError::HttpError {
        status: status.as_u16(),
        message,
    }
    .into())
}

/// 429 maps to `RateLimited` whether or not the service sent a wait
fn rate_limited(response: &Response) -> Option<Error> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let seconds = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Some(NetworkError::RateLimited { seconds }.into())
}

fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        NetworkError::Timeout {
            url: e.url().map(redacted).unwrap_or_default(),
        }
        .into()
    } else if e.is_connect() {
        NetworkError::ConnectionRefused(e.without_url().to_string()).into()
    } else {
        NetworkError::RequestFailed(e.without_url().to_string()).into()
    }
}

/// URL without its query string, which carries the API token
fn redacted(url: &url::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_network_config() {
        let config = NetworkConfig {
            timeout: 10,
            connect_timeout: 2,
            retries: 5,
            retry_delay: 0,
        };
        let net = NetConfig::from(&config);
        assert_eq!(net.timeout, Duration::from_secs(10));
        assert_eq!(net.connect_timeout, Duration::from_secs(2));
        assert_eq!(net.retry_count, 5);
        assert_eq!(net.retry_delay, Duration::ZERO);
        assert!(net.user_agent.starts_with("pgb/"));
    }

    #[test]
    fn test_redacted_drops_token() {
        let url = url::Url::parse("https://build.phonegap.com/api/v1/apps?auth_token=T").unwrap();
        assert_eq!(redacted(&url), "https://build.phonegap.com/api/v1/apps");
    }
}
