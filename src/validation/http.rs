//! # HTTP form-post validation service.
//!
//! Posts `<field>=<uid>` as `application/x-www-form-urlencoded` to a fixed
//! URL. Any 2xx status means the card is authorized, any other status means
//! it is not. Transport failures and client-side timeouts surface as
//! [`ValidationError`] and are therefore fail-closed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::card::Uid;
use crate::error::ValidationError;
use crate::validation::service::ValidationService;

/// Settings for [`HttpValidator`].
#[derive(Clone, Debug)]
pub struct HttpValidatorConfig {
    /// Endpoint receiving the form post.
    pub url: String,
    /// Form field carrying the uid.
    pub field: String,
    /// Client-side request timeout.
    ///
    /// The validator applies its own (usually shorter) deadline on top.
    pub timeout: Duration,
}

impl HttpValidatorConfig {
    /// Config for `url` with the default field and timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for HttpValidatorConfig {
    /// - `url = ""` (must be set)
    /// - `field = "eingabe"`
    /// - `timeout = 10s`
    fn default() -> Self {
        Self {
            url: String::new(),
            field: "eingabe".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Validation service backed by a remote HTTP endpoint.
pub struct HttpValidator {
    cfg: HttpValidatorConfig,
    client: reqwest::Client,
}

impl HttpValidator {
    /// Builds the HTTP client.
    pub fn new(cfg: HttpValidatorConfig) -> Result<Self, ValidationError> {
        if cfg.url.trim().is_empty() {
            return Err(ValidationError::Client {
                error: "validation url is empty".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ValidationError::Client {
                error: e.to_string(),
            })?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &HttpValidatorConfig {
        &self.cfg
    }
}

#[async_trait]
impl ValidationService for HttpValidator {
    fn name(&self) -> &str {
        "http"
    }

    async fn validate(&self, uid: &Uid) -> Result<bool, ValidationError> {
        let response = self
            .client
            .post(&self.cfg.url)
            .form(&[(self.cfg.field.as_str(), uid.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ValidationError::Timeout {
                        timeout: self.cfg.timeout,
                    }
                } else {
                    ValidationError::Transport {
                        error: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        debug!(uid = %uid, status = status.as_u16(), "validation service answered");
        Ok(status.is_success())
    }
}
