//! Connection
//!
//! Everything scoped to one configured connection: config, environment
//! snapshot, the client cache and the account resolver.

use super::account::{AccountResolver, CallerIdentity};
use super::auth::{self, Environment};
use super::cache::ClientCache;
use super::client::ServiceClient;
use super::error::ConfigurationError;
use super::http::AliHttpClient;
use super::service::Service;
use crate::config::ConnectionConfig;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// A live connection
pub struct Connection {
    config: ConnectionConfig,
    env: Environment,
    http: AliHttpClient,
    clients: ClientCache,
    account: AccountResolver,
    endpoints: HashMap<Service, String>,
}

impl Connection {
    /// Open a connection; credentials are resolved lazily on first client use
    pub fn new(config: ConnectionConfig, env: Environment) -> Result<Self> {
        let http = AliHttpClient::new(config.request_timeout(), config.attempts())?;

        Ok(Self {
            config,
            env,
            http,
            clients: ClientCache::new(),
            account: AccountResolver::new(),
            endpoints: HashMap::new(),
        })
    }

    /// Override the endpoint of one service for every region
    pub fn with_endpoint(mut self, service: Service, endpoint: &str) -> Self {
        self.endpoints.insert(service, endpoint.to_string());
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Every region this connection queries
    pub fn regions(&self) -> Result<Vec<String>, ConfigurationError> {
        auth::resolve_regions(&self.config, &self.env)
    }

    pub fn default_region(&self) -> Result<String, ConfigurationError> {
        auth::default_region(&self.config, &self.env)
    }

    /// Client for `(service, region)`, built on first use.
    /// Global services share one client regardless of the region asked for.
    pub async fn client(&self, service: Service, region: &str) -> Result<Arc<ServiceClient>> {
        let region = if service.is_regional() { region } else { "" };

        let client = self
            .clients
            .get_or_try_insert_with(service, region, || {
                let credentials = auth::resolve_credentials(&self.config, &self.env)?;
                let client =
                    ServiceClient::new(service, region, Arc::new(credentials), self.http.clone())?;
                Ok::<_, ConfigurationError>(match self.endpoints.get(&service) {
                    Some(endpoint) => client.with_endpoint(endpoint),
                    None => client,
                })
            })
            .await?;

        Ok(client)
    }

    /// Caller identity, resolved at most once per connection
    pub async fn caller_identity(&self) -> Result<Arc<CallerIdentity>> {
        if let Some(identity) = self.account.cached() {
            return Ok(identity);
        }

        let sts = self.client(Service::Sts, "").await?;
        self.account.resolve(sts).await
    }

    pub async fn account_id(&self) -> Result<String> {
        Ok(self.caller_identity().await?.account_id.clone())
    }
}
