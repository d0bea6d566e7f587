//! # License Verification Feed Client
//!
//! Queries an external primary-source verification feed for the status a
//! board currently reports for a license:
//!
//! ```text
//! GET {VERIFICATION_FEED_URL}/licenses/{jurisdiction}/{license_number}
//! → 200 { "status": "active", "detail": "...", "source": "..." }
//! ```
//!
//! Results are stored as [`StatusObservation`]s. They never change a
//! license's status; a disagreement only surfaces as an advisory on the
//! next snapshot.
//!
//! Transport failures and 5xx responses are retried with exponential
//! backoff (200ms, 400ms, 800ms). 4xx responses are returned at once.

use std::time::Duration;

use credmate_core::{JurisdictionId, LicenseNumber, Timestamp};
use credmate_ledger::{License, LicenseStatus, StatusObservation};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source label used when the feed does not name itself.
pub const DEFAULT_SOURCE: &str = "verification_feed";

/// Errors from verification feed calls.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The feed answered with a non-2xx status.
    #[error("verification feed {endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The feed has no record of the license.
    #[error("verification feed has no record of {jurisdiction} license {license_number}")]
    NotListed {
        jurisdiction: JurisdictionId,
        license_number: LicenseNumber,
    },
    /// The response body did not match the expected shape.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The configured base URL cannot carry path segments.
    #[error("verification feed base URL {0} cannot be a base")]
    InvalidBaseUrl(Url),
}

impl VerificationError {
    /// Whether a later retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A feed response body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedRecord {
    pub status: LicenseStatus,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// HTTP client for the verification feed.
#[derive(Debug, Clone)]
pub struct VerificationFeedClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    base_delay: Duration,
}

impl VerificationFeedClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    /// Override the retry budget and the first backoff delay.
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn record_url(
        &self,
        jurisdiction: &JurisdictionId,
        license_number: &LicenseNumber,
    ) -> Result<Url, VerificationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| VerificationError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["licenses", jurisdiction.as_str(), license_number.as_str()]);
        Ok(url)
    }

    /// Fetch what the feed currently reports for a license.
    pub async fn fetch_status(
        &self,
        jurisdiction: &JurisdictionId,
        license_number: &LicenseNumber,
    ) -> Result<FeedRecord, VerificationError> {
        let url = self.record_url(jurisdiction, license_number)?;
        let endpoint = url.path().to_string();

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url, &endpoint).await {
                Err(VerificationError::Status { status: 404, .. }) => {
                    return Err(VerificationError::NotListed {
                        jurisdiction: jurisdiction.clone(),
                        license_number: license_number.clone(),
                    });
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        %endpoint,
                        "verification feed request failed, retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn fetch_once(&self, url: &Url, endpoint: &str) -> Result<FeedRecord, VerificationError> {
        let response = self
            .http
            .get(url.clone())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| VerificationError::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<FeedRecord>()
            .await
            .map_err(|source| VerificationError::Deserialization {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    /// Query the feed for `license` and turn the answer into an observation.
    pub async fn verify_license(
        &self,
        license: &License,
        observed_at: Timestamp,
    ) -> Result<StatusObservation, VerificationError> {
        let record = self
            .fetch_status(&license.jurisdiction_id, &license.license_number)
            .await?;
        Ok(StatusObservation {
            license_id: license.license_id,
            reported_status: record.status,
            source: record.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            observed_at,
            detail: record.detail,
        })
    }
}
