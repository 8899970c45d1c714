//! Alibaba Cloud Client
//!
//! An RPC client bound to one service and region, combining credentials,
//! request signing and the HTTP layer.

use super::auth::Credentials;
use super::error::{api_error, ConfigurationError};
use super::http::AliHttpClient;
use super::service::Service;
use super::signer::{self, SIGNATURE_METHOD, SIGNATURE_VERSION};
use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Request parameters for an RPC action
pub type Params = BTreeMap<String, String>;

/// Throttling backoff: first delay
const THROTTLING_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
/// Throttling backoff: upper bound on a single delay
const THROTTLING_MAX_INTERVAL: Duration = Duration::from_secs(5);
/// Throttling backoff: give up after this much time in total
const THROTTLING_MAX_ELAPSED: Duration = Duration::from_secs(30);

/// Client for one `(service, region)` pair
#[derive(Clone)]
pub struct ServiceClient {
    service: Service,
    region: String,
    endpoint: String,
    credentials: Arc<Credentials>,
    http: AliHttpClient,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ServiceClient {
    /// Create a client; region-scoped services require a non-empty region
    pub fn new(
        service: Service,
        region: &str,
        credentials: Arc<Credentials>,
        http: AliHttpClient,
    ) -> Result<Self, ConfigurationError> {
        if service.is_regional() && region.is_empty() {
            return Err(ConfigurationError::MissingRegion {
                service: service.name(),
            });
        }

        Ok(Self {
            service,
            region: region.to_string(),
            endpoint: service.endpoint(region),
            credentials,
            http,
        })
    }

    /// Point the client at a different endpoint (private networks, tests)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the signed request URL for an action
    fn signed_url(&self, action: &str, params: &Params) -> Result<Url> {
        let mut all = params.clone();
        all.insert("Action".to_string(), action.to_string());
        all.insert("Format".to_string(), "JSON".to_string());
        all.insert("Version".to_string(), self.service.api_version().to_string());
        all.insert("AccessKeyId".to_string(), self.credentials.access_key_id.clone());
        all.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
        all.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
        all.insert("SignatureNonce".to_string(), uuid::Uuid::new_v4().to_string());
        all.insert(
            "Timestamp".to_string(),
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        if self.service.is_regional() && !all.contains_key("RegionId") {
            all.insert("RegionId".to_string(), self.region.clone());
        }

        let query = signer::signed_query(&all, &self.credentials.access_key_secret)?;

        let mut url = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid {} endpoint: {}", self.service, self.endpoint))?;
        url.set_path("/");
        url.set_query(Some(&query));
        Ok(url)
    }

    /// Invoke an RPC action
    pub async fn call(&self, action: &str, params: &Params) -> Result<Value> {
        let url = self.signed_url(action, params)?;
        self.http.get(url.as_str(), self.service, action).await
    }

    /// Invoke an RPC action, retrying `Throttling*` errors with exponential backoff
    pub async fn call_with_throttling_retry(&self, action: &str, params: &Params) -> Result<Value> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(THROTTLING_INITIAL_INTERVAL)
            .with_max_interval(THROTTLING_MAX_INTERVAL)
            .with_max_elapsed_time(Some(THROTTLING_MAX_ELAPSED))
            .build();

        backoff::future::retry(policy, || async move {
            self.call(action, params).await.map_err(|e| {
                if api_error(&e).is_some_and(|api| api.is_throttling()) {
                    tracing::warn!("{} {} throttled, backing off", self.service, action);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}
