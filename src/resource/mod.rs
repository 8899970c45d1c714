//! Table abstraction layer
//!
//! This module provides a data-driven approach to exposing Alibaba Cloud
//! resources as tables. Table definitions are loaded from JSON files at compile
//! time, so new tables can be added without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`fetcher`] - Runs list/get actions with pagination support
//! - [`hydrate`] - Per-item detail calls behind some columns
//! - [`transform`] - Shapes raw items into typed rows
//! - [`query`] - Region fan-out, qualifiers, limits and row streaming
//!
//! # Table Definitions
//!
//! Tables are defined in JSON files under `src/resources/`, one per service:
//! - `ecs.json` - instances, disks, images, snapshots, security groups, ...
//! - `vpc.json` - VPCs, vSwitches, route tables, EIPs, NAT gateways
//! - `ram.json` - users, groups, roles, policies, password policy
//!
//! # Example
//!
//! ```ignore
//! use alicloud_tables::resource::{collect, require_table, QueryContext};
//!
//! async fn running_instances(conn: &Connection) -> anyhow::Result<Vec<Row>> {
//!     let table = require_table("alicloud_ecs_instance")?;
//!     let ctx = QueryContext::new().with_qual("status", "Running");
//!     collect(conn, table, &ctx).await
//! }
//! ```

pub mod fetcher;
pub mod hydrate;
pub mod query;
pub mod registry;
pub mod transform;

pub use fetcher::{get_item, list_items, ClientSource, ItemSink, PageSource};
pub use query::{collect, execute, require_table, QueryContext};
pub use registry::{get_all_table_names, get_registry, get_table, ColumnDef, TableDef};
pub use transform::{Row, RowContext};
