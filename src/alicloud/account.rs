//! Account Resolver
//!
//! Resolves the caller identity behind the connection credentials with a
//! single `GetCallerIdentity` call. Concurrent first callers share one
//! in-flight lookup; a successful result is kept for the connection lifetime.
//! A failed lookup is reported to every caller that was waiting on it and is
//! not cached.

use super::client::{Params, ServiceClient};
use super::error::api_error;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// Result of `GetCallerIdentity`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account_id: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub principal_id: String,
    #[serde(default)]
    pub identity_type: String,
}

/// Anything that can answer "who am I"
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity>;
}

#[async_trait]
impl IdentitySource for ServiceClient {
    async fn caller_identity(&self) -> Result<CallerIdentity> {
        let response = self.call("GetCallerIdentity", &Params::new()).await?;
        serde_json::from_value(response).context("Failed to parse GetCallerIdentity response")
    }
}

type Lookup = Shared<BoxFuture<'static, Result<Arc<CallerIdentity>, Arc<anyhow::Error>>>>;

/// Single-flight, memoized caller identity
#[derive(Default)]
pub struct AccountResolver {
    resolved: OnceLock<Arc<CallerIdentity>>,
    in_flight: Mutex<Option<Lookup>>,
}

impl AccountResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity, if a lookup already succeeded
    pub fn cached(&self) -> Option<Arc<CallerIdentity>> {
        self.resolved.get().cloned()
    }

    /// Resolve the caller identity, calling `source` at most once at a time
    pub async fn resolve(&self, source: Arc<dyn IdentitySource>) -> Result<Arc<CallerIdentity>> {
        if let Some(identity) = self.cached() {
            return Ok(identity);
        }

        let lookup = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(identity) = self.cached() {
                return Ok(identity);
            }
            match in_flight.as_ref() {
                Some(lookup) => lookup.clone(),
                None => {
                    tracing::debug!("Resolving caller identity");
                    let lookup: Lookup = async move {
                        source
                            .caller_identity()
                            .await
                            .map(Arc::new)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(lookup.clone());
                    lookup
                }
            }
        };

        let result = lookup.clone().await;

        {
            let mut in_flight = self.in_flight.lock().await;
            if let Ok(identity) = &result {
                let _ = self.resolved.set(identity.clone());
            }
            if in_flight.as_ref().is_some_and(|current| current.ptr_eq(&lookup)) {
                *in_flight = None;
            }
        }

        result.map_err(|e| {
            tracing::error!("Failed to resolve caller identity: {:#}", e);
            match api_error(&e) {
                Some(api) => anyhow::Error::new(api.clone()).context("Failed to resolve caller identity"),
                None => anyhow::anyhow!("Failed to resolve caller identity: {:#}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alicloud::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSts {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl FakeSts {
        fn new(fail_first: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl IdentitySource for FakeSts {
        async fn caller_identity(&self) -> Result<CallerIdentity> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_first && call == 0 {
                return Err(ApiError::from_response(
                    "StsService",
                    "GetCallerIdentity",
                    403,
                    r#"{"Code":"InvalidAccessKeyId.NotFound","Message":"Specified access key is not found."}"#,
                )
                .into());
            }
            Ok(CallerIdentity {
                account_id: "1234567890123456".to_string(),
                arn: "acs:ram::1234567890123456:user/alice".to_string(),
                user_id: "2000".to_string(),
                principal_id: "2000".to_string(),
                identity_type: "RAMUser".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_lookup() {
        let resolver = Arc::new(AccountResolver::new());
        let sts = FakeSts::new(false);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let resolver = resolver.clone();
                let source: Arc<dyn IdentitySource> = sts.clone();
                tokio::spawn(async move { resolver.resolve(source).await })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            let identity = handle.unwrap().unwrap();
            assert_eq!(identity.account_id, "1234567890123456");
        }
        assert_eq!(sts.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolved_identity_is_cached() {
        let resolver = AccountResolver::new();
        let sts = FakeSts::new(false);

        resolver.resolve(sts.clone()).await.unwrap();
        resolver.resolve(sts.clone()).await.unwrap();

        assert_eq!(sts.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cached().is_some());
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let resolver = Arc::new(AccountResolver::new());
        let sts = FakeSts::new(true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                let source: Arc<dyn IdentitySource> = sts.clone();
                tokio::spawn(async move { resolver.resolve(source).await })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            let err = handle.unwrap().unwrap_err();
            let api = api_error(&err).expect("api error is preserved");
            assert_eq!(api.code, "InvalidAccessKeyId.NotFound");
        }
        assert_eq!(sts.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cached().is_none());

        let identity = resolver.resolve(sts.clone()).await.unwrap();
        assert_eq!(identity.identity_type, "RAMUser");
        assert_eq!(sts.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_caller_identity() {
        let identity: CallerIdentity = serde_json::from_str(
            r#"{"IdentityType":"Account","RequestId":"5A2B","AccountId":"1234","PrincipalId":"1234","UserId":"1234","Arn":"acs:ram::1234:root"}"#,
        )
        .unwrap();
        assert_eq!(identity.account_id, "1234");
        assert_eq!(identity.arn, "acs:ram::1234:root");
    }
}
