//! Connection-scoped client cache
//!
//! Memoizing factory: one client per `(service, region)` key, built on the
//! first request and shared afterwards. No eviction; the cache lives as long
//! as the connection that owns it.

use super::client::ServiceClient;
use super::service::Service;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub service: Service,
    pub region: String,
}

impl ClientKey {
    pub fn new(service: Service, region: &str) -> Self {
        Self {
            service,
            region: region.to_string(),
        }
    }
}

/// Clients memoized per `(service, region)`
pub struct ClientCache<C = ServiceClient> {
    clients: RwLock<HashMap<ClientKey, Arc<C>>>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> ClientCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for the key, building it with `build` on a miss.
    ///
    /// Two callers racing on the same miss may both build; the first one to
    /// store wins and both get the stored instance.
    pub async fn get_or_try_insert_with<E>(
        &self,
        service: Service,
        region: &str,
        build: impl FnOnce() -> Result<C, E>,
    ) -> Result<Arc<C>, E> {
        let key = ClientKey::new(service, region);

        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        tracing::debug!("Creating {} client for region '{}'", service, region);
        let client = Arc::new(build()?);

        let mut clients = self.clients.write().await;
        Ok(clients.entry(key).or_insert(client).clone())
    }

    /// Number of cached clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
