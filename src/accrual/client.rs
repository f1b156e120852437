use crate::domain::accrual::AccrualResponse;
use crate::domain::order::OrderNumber;
use crate::error::{AccrualError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use std::time::Duration;
use tracing::debug;

/// Classified result of a single accrual lookup.
#[derive(Debug)]
pub enum AccrualOutcome {
    /// 200 with a decodable body.
    Success(AccrualResponse),
    /// 204: the accrual service has not registered the order yet.
    NotFound,
    /// 429: back off for this long before polling again.
    RateLimited(Duration),
    /// 5xx, any other unexpected status, network failure or bad body.
    TransientFailure(AccrualError),
}

/// One lookup per order number against the accrual service.
#[async_trait]
pub trait AccrualApi: Send + Sync {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome;
}

/// Longest `Retry-After` honored unless configured otherwise.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// HTTP client for `GET {base}/api/orders/{number}`.
#[derive(Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
    default_retry_after: Duration,
    max_retry_after: Duration,
}

impl AccrualClient {
    /// Builds a client with a per-request timeout. `default_retry_after`
    /// applies to 429 responses without a usable `Retry-After` header.
    pub fn new(base_url: &str, timeout: Duration, default_retry_after: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AccrualError::from)?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url),
            default_retry_after,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        })
    }

    /// Caps the pause requested by a 429, including the default one.
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    fn retry_after(&self, value: Option<&HeaderValue>) -> Duration {
        parse_retry_after(value)
            .unwrap_or(self.default_retry_after)
            .min(self.max_retry_after)
    }

    pub fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait]
impl AccrualApi for AccrualClient {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        let url = self.order_url(number);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return AccrualOutcome::TransientFailure(e.into()),
        };

        let status = response.status();
        debug!(order = %number, status = status.as_u16(), "accrual service replied");

        match status {
            StatusCode::OK => match response.bytes().await {
                Ok(body) => match serde_json::from_slice::<AccrualResponse>(&body) {
                    Ok(parsed) => AccrualOutcome::Success(parsed),
                    Err(e) => {
                        AccrualOutcome::TransientFailure(AccrualError::MalformedBody(e.to_string()))
                    }
                },
                Err(e) => AccrualOutcome::TransientFailure(e.into()),
            },
            StatusCode::NO_CONTENT => AccrualOutcome::NotFound,
            StatusCode::TOO_MANY_REQUESTS => {
                AccrualOutcome::RateLimited(self.retry_after(response.headers().get(RETRY_AFTER)))
            }
            other => AccrualOutcome::TransientFailure(AccrualError::UnexpectedStatus(
                other.as_u16(),
            )),
        }
    }
}

/// Parses a `Retry-After` header given in whole seconds.
///
/// The HTTP-date form is not used by the accrual service and yields `None`.
pub fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    let seconds: u64 = value?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
