//! HTTP utilities for Alibaba Cloud RPC calls

use super::error::ApiError;
use super::service::Service;
use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const TRANSPORT_INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const TRANSPORT_MAX_INTERVAL: Duration = Duration::from_secs(3);

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for signed RPC calls
#[derive(Clone)]
pub struct AliHttpClient {
    client: Client,
    attempts: u32,
}

impl AliHttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration, attempts: u32) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("alicloud-tables/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            attempts: attempts.max(1),
        })
    }

    /// GET a fully signed RPC URL and decode the JSON body.
    ///
    /// Timeouts and connection failures are retried up to the configured
    /// number of attempts; API errors are returned as [`ApiError`].
    pub async fn get(&self, url: &str, service: Service, action: &str) -> Result<Value> {
        tracing::debug!("GET {} {}", service, action);

        // Attempts bound the policy, not elapsed time
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(TRANSPORT_INITIAL_INTERVAL)
            .with_max_interval(TRANSPORT_MAX_INTERVAL)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0;
        let response = backoff::future::retry(policy, || {
            attempt += 1;
            let attempt = attempt;
            async move {
                self.client.get(url).send().await.map_err(|e| {
                    if (e.is_timeout() || e.is_connect()) && attempt < self.attempts {
                        tracing::warn!(
                            "{} {} transport error (attempt {}/{}): {}",
                            service,
                            action,
                            attempt,
                            self.attempts,
                            e
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
        .with_context(|| format!("Failed to send {} {} request", service, action))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!(
                "{} {} API error: {} - {}",
                service,
                action,
                status,
                sanitize_for_log(&body)
            );
            return Err(ApiError::from_response(service.name(), action, status.as_u16(), &body).into());
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}
