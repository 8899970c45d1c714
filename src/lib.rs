//! alicloud-tables
//!
//! Alibaba Cloud resources exposed as queryable tables: a connection-scoped
//! service client cache, a single-flight account resolver, a signed POP RPC
//! client and a data-driven table registry.

pub mod alicloud;
pub mod config;
pub mod resource;

/// Version injected at compile time via ALICLOUD_TABLES_VERSION (set by CI),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("ALICLOUD_TABLES_VERSION") {
    Some(v) => v,
    None => "dev",
};
