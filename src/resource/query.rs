//! Query execution
//!
//! Local stand-in for the host's list/get/hydrate engine: picks regions,
//! chooses get or list, hydrates what the requested columns need, shapes
//! rows and streams them over a channel.

use super::fetcher::{get_item, list_items, ClientSource, ItemSink};
use super::hydrate::{hydrate_item, plan, HydratePlan};
use super::registry::{ColumnDef, TableDef};
use super::transform::{shape_row, Row, RowContext};
use crate::alicloud::error::api_error;
use crate::alicloud::Connection;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// What the caller asked for
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Requested columns; empty means every column
    pub columns: Vec<String>,
    /// Equality qualifiers, column name to value
    pub quals: HashMap<String, String>,
    /// Maximum number of rows to return
    pub limit: Option<usize>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_qual(mut self, column: &str, value: &str) -> Self {
        self.quals.insert(column.to_string(), value.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rows still wanted after `emitted` were sent; `None` means unbounded
    pub fn rows_remaining(&self, emitted: usize) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(emitted))
    }
}

/// Columns after validation
struct Projection<'a> {
    /// Columns to compute: requested plus qualified
    computed: Vec<&'a ColumnDef>,
    /// Columns to send
    output: Vec<&'a ColumnDef>,
}

fn project<'a>(table: &'a TableDef, ctx: &QueryContext) -> Result<Projection<'a>> {
    let lookup = |name: &str| {
        table
            .column(name)
            .with_context(|| format!("{} has no column '{}'", table.name, name))
    };

    let output: Vec<&ColumnDef> = if ctx.columns.is_empty() {
        table.columns.iter().collect()
    } else {
        ctx.columns.iter().map(|c| lookup(c)).collect::<Result<_>>()?
    };

    let mut computed = output.clone();
    for qual in ctx.quals.keys() {
        let column = lookup(qual)?;
        if !computed.iter().any(|c| c.name == column.name) {
            computed.push(column);
        }
    }

    Ok(Projection { computed, output })
}

/// Loose equality between a qualifier and a column value
fn matches_qual(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Null => false,
        other => other.to_string() == expected,
    }
}

/// Shapes and sends the items of one region
struct RowStreamer<'a> {
    table: &'a TableDef,
    source: &'a ClientSource<'a>,
    projection: &'a Projection<'a>,
    hydrates: &'a HydratePlan<'a>,
    query: &'a QueryContext,
    row_ctx: RowContext<'a>,
    /// Rows sent so far across every region
    emitted: &'a mut usize,
    tx: &'a mpsc::Sender<Row>,
    closed: bool,
}

impl RowStreamer<'_> {
    fn satisfied(&self) -> bool {
        self.query.rows_remaining(*self.emitted) == Some(0)
    }
}

#[async_trait]
impl ItemSink for RowStreamer<'_> {
    async fn push(&mut self, item: Value) -> Result<bool> {
        if self.satisfied() || self.closed {
            return Ok(false);
        }

        let hydrated = hydrate_item(self.source, self.table, &self.hydrates.calls, &item, &self.row_ctx).await?;
        let mut row = shape_row(self.table, &self.projection.computed, &item, &hydrated, &self.row_ctx);

        let keep = self
            .query
            .quals
            .iter()
            .all(|(column, expected)| row.get(column).is_some_and(|v| matches_qual(v, expected)));
        if !keep {
            return Ok(true);
        }

        row.retain(|name, _| self.projection.output.iter().any(|c| &c.name == name));

        if self.tx.send(row).await.is_err() {
            tracing::debug!("{}: receiver dropped, stopping", self.table.name);
            self.closed = true;
            return Ok(false);
        }
        *self.emitted += 1;
        Ok(!self.satisfied())
    }
}

/// Regions to visit: the `region` qualifier, else every connection region.
/// Global tables run once in the default region.
fn target_regions(conn: &Connection, table: &TableDef, ctx: &QueryContext) -> Result<Vec<String>> {
    if table.is_global {
        return Ok(vec![conn.default_region()?]);
    }

    let regions = conn.regions()?;
    match ctx.quals.get("region") {
        Some(wanted) => Ok(regions.into_iter().filter(|r| r == wanted).collect()),
        None => Ok(regions),
    }
}

/// Execute a query, sending rows to `tx`. Returns the number of rows sent.
pub async fn execute(
    conn: &Connection,
    table: &TableDef,
    ctx: &QueryContext,
    tx: mpsc::Sender<Row>,
) -> Result<usize> {
    let projection = project(table, ctx)?;
    let hydrates = plan(table, &projection.computed);
    let mut emitted = 0usize;

    if ctx.rows_remaining(0) == Some(0) {
        return Ok(0);
    }

    let account_id = if hydrates.account {
        Some(conn.account_id().await?)
    } else {
        None
    };

    let get_key = table
        .get
        .as_ref()
        .and_then(|get| ctx.quals.get(&get.key_column).map(|key| (get, key)));

    for region in target_regions(conn, table, ctx)? {
        let client = conn.client(table.service, &region).await?;
        let source = ClientSource {
            client: &client,
            retry_throttling: table.retry_throttling,
        };
        let row_ctx = RowContext {
            region: &region,
            account_id: account_id.as_deref(),
        };

        tracing::info!("Querying {} in {}", table.name, region);

        let mut streamer = RowStreamer {
            table,
            source: &source,
            projection: &projection,
            hydrates: &hydrates,
            query: ctx,
            row_ctx,
            emitted: &mut emitted,
            tx: &tx,
            closed: false,
        };

        let result = match get_key {
            Some((get, key)) => match get_item(&source, get, key, &row_ctx).await {
                Ok(Some(item)) => streamer.push(item).await.map(|_| ()),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
            None => list_items(&source, &table.list, &mut streamer).await.map(|_| ()),
        };
        let closed = streamer.closed;

        if let Err(e) = result {
            match api_error(&e) {
                Some(api) if api.is_code_in(&conn.config().ignore_error_codes) => {
                    tracing::warn!("{} in {}: ignoring {}", table.name, region, api.code);
                }
                _ => {
                    return Err(e).with_context(|| format!("Failed to query {} in {}", table.name, region))
                }
            }
        }

        if closed || ctx.rows_remaining(emitted) == Some(0) {
            break;
        }
    }

    tracing::info!("{}: {} rows", table.name, emitted);
    Ok(emitted)
}

/// Execute a query and collect every row
pub async fn collect(conn: &Connection, table: &TableDef, ctx: &QueryContext) -> Result<Vec<Row>> {
    let (tx, mut rx) = mpsc::channel(64);
    let run = execute(conn, table, ctx, tx);
    let gather = async {
        let mut rows = Vec::new();
        while let Some(row) = rx.recv().await {
            rows.push(row);
        }
        rows
    };

    let (result, rows) = tokio::join!(run, gather);
    result?;
    Ok(rows)
}

/// Validate a table name
pub fn require_table(name: &str) -> Result<&'static TableDef> {
    match super::registry::get_table(name) {
        Some(table) => Ok(table),
        None => bail!("Unknown table: {}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::registry::get_table;
    use serde_json::json;

    #[test]
    fn test_project_defaults_to_all_columns() {
        let table = get_table("alicloud_vpc").unwrap();
        let projection = project(table, &QueryContext::new()).unwrap();
        assert_eq!(projection.output.len(), table.columns.len());
    }

    #[test]
    fn test_project_adds_qualified_columns() {
        let table = get_table("alicloud_vpc").unwrap();
        let ctx = QueryContext::new()
            .with_columns(&["vpc_id"])
            .with_qual("status", "Available");
        let projection = project(table, &ctx).unwrap();

        assert_eq!(projection.output.len(), 1);
        assert_eq!(projection.computed.len(), 2);
    }

    #[test]
    fn test_project_rejects_unknown_column() {
        let table = get_table("alicloud_vpc").unwrap();
        let err = project(table, &QueryContext::new().with_columns(&["nope"])).err().unwrap();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_matches_qual() {
        assert!(matches_qual(&json!("Available"), "Available"));
        assert!(matches_qual(&json!(22), "22"));
        assert!(matches_qual(&json!(true), "true"));
        assert!(!matches_qual(&Value::Null, ""));
    }

    #[test]
    fn test_rows_remaining() {
        let ctx = QueryContext::new().with_limit(2);
        assert_eq!(ctx.rows_remaining(0), Some(2));
        assert_eq!(ctx.rows_remaining(5), Some(0));

        let unlimited = QueryContext::new();
        assert_eq!(unlimited.rows_remaining(1000), None);
    }

    #[test]
    fn test_require_table() {
        assert!(require_table("alicloud_ecs_instance").is_ok());
        assert!(require_table("aws_s3_bucket").is_err());
    }
}
