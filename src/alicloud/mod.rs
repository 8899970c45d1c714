//! Alibaba Cloud API interaction module
//!
//! This module provides the core functionality for talking to Alibaba Cloud
//! POP RPC APIs: credential and region resolution, request signing, the HTTP
//! client, and the per-connection client cache and account resolver.
//!
//! # Module Structure
//!
//! - [`auth`] - Credential and region resolution
//! - [`signer`] - Signature version 1.0 (HMAC-SHA1)
//! - [`http`] - HTTP utilities for RPC calls
//! - [`client`] - Client bound to one `(service, region)`
//! - [`cache`] - Connection-scoped client cache
//! - [`account`] - Single-flight caller identity lookup
//! - [`connection`] - Ties the above together for one connection
//!
//! # Example
//!
//! ```ignore
//! use alicloud_tables::alicloud::{Connection, Environment, Service};
//!
//! async fn example(conn: &Connection) -> anyhow::Result<()> {
//!     let ecs = conn.client(Service::Ecs, "cn-hangzhou").await?;
//!     let regions = ecs.call("DescribeRegions", &Default::default()).await?;
//!     let account_id = conn.account_id().await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod auth;
pub mod cache;
pub mod client;
pub mod connection;
pub mod error;
pub mod http;
pub mod service;
pub mod signer;

pub use account::{AccountResolver, CallerIdentity, IdentitySource};
pub use auth::{Credentials, Environment};
pub use cache::ClientCache;
pub use client::{Params, ServiceClient};
pub use connection::Connection;
pub use error::{api_error, format_api_error, ApiError, ConfigurationError};
pub use service::Service;
