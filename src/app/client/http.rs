//! Core HTTP operations with rate limiting and response classification
//!
//! Every request waits on a shared direct rate limiter (with jitter, to avoid
//! producers firing in lockstep) and maps the outcome onto the three-way
//! [`ApiError`] taxonomy. Retrying is left to the caller.

use std::num::NonZeroU32;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::constants::http;
use crate::errors::{ApiError, ApiResult, ConfigError, ConfigResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> ConfigResult<DirectRateLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            ConfigError::invalid("client.rate_limit_rps", rate_limit_rps, "must be non-zero")
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    /// GET `url` and decode a JSON body
    ///
    /// `resource` names the unit in error messages. 404 maps to `NotFound`;
    /// transport failures, 429 and 5xx map to `Transient`; any other
    /// non-success status or an undecodable body maps to `Fatal`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url, resource: &str) -> ApiResult<T> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(http::RATE_LIMIT_JITTER))
            .await;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_transport(resource, &e))?;

        let status = response.status();
        if let Some(err) = classify_status(resource, status) {
            debug!("{} -> HTTP {}", url, status);
            return Err(err);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(resource, &e))?;

        serde_json::from_slice(&body)
            .map_err(|e| ApiError::fatal(resource, format!("invalid JSON body: {}", e)))
    }

    /// Issue a GET and return whatever status the server answers with
    pub async fn probe(&self, url: &Url) -> Result<StatusCode, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;
        Ok(response.status())
    }
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn classify_status(resource: &str, status: StatusCode) -> Option<ApiError> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND {
        Some(ApiError::not_found(resource))
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(ApiError::transient(resource, format!("HTTP {}", status)))
    } else {
        Some(ApiError::fatal(resource, format!("HTTP {}", status)))
    }
}

fn classify_transport(resource: &str, err: &reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::fatal(resource, err.to_string())
    } else {
        ApiError::transient(resource, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::config::ClientConfig;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let rate_limiter = HttpHandler::build_rate_limiter(5).unwrap();
        rate_limiter.until_ready().await;
    }

    #[test]
    fn test_rate_limiter_zero_fails() {
        assert!(HttpHandler::build_rate_limiter(0).is_err());
    }

    #[test]
    fn test_http_handler_creation() {
        let config = ClientConfig::default();
        let client = config.build_http_client().unwrap();
        assert!(HttpHandler::new(client, 5).is_ok());
    }

    #[test]
    fn test_status_classification() {
        let kind = |code: u16| {
            classify_status("lineups", StatusCode::from_u16(code).unwrap()).map(|e| e.kind())
        };

        assert_eq!(kind(200), None);
        assert_eq!(kind(404), Some(ErrorKind::NotFound));
        assert_eq!(kind(429), Some(ErrorKind::Transient));
        assert_eq!(kind(500), Some(ErrorKind::Transient));
        assert_eq!(kind(503), Some(ErrorKind::Transient));
        assert_eq!(kind(400), Some(ErrorKind::Fatal));
        assert_eq!(kind(403), Some(ErrorKind::Fatal));
    }
}
