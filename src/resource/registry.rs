//! Table Registry - Load table definitions from JSON
//!
//! This module loads all Alibaba Cloud table definitions from embedded JSON
//! files and provides lookup functions for the rest of the crate.

use crate::alicloud::Service;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded table JSON files (compiled into the binary)
const TABLE_FILES: &[&str] = &[
    include_str!("../resources/ecs.json"),
    include_str!("../resources/vpc.json"),
    include_str!("../resources/ram.json"),
    include_str!("../resources/slb.json"),
    include_str!("../resources/rds.json"),
    include_str!("../resources/kms.json"),
    include_str!("../resources/actiontrail.json"),
    include_str!("../resources/cms.json"),
    include_str!("../resources/autoscaling.json"),
];

/// Name of the built-in hydrate that resolves the caller identity
pub const ACCOUNT_HYDRATE: &str = "account";

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Int,
    Double,
    Bool,
    Json,
    Timestamp,
    IpAddr,
    Cidr,
}

/// Column transform applied after extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// `[{TagKey, TagValue}]` or `[{Key, Value}]` into `{key: value}`
    Tags,
    /// Parse a JSON document embedded in a string
    JsonString,
    Lowercase,
    /// Length of an array
    Count,
}

/// Columns every table gets for free
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Title,
    Akas,
    Region,
    AccountId,
}

/// Column definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub description: String,
    /// Dot paths into the item, or into the hydrate result when `hydrate` is set.
    /// `"path"` takes one path or a list tried in order.
    #[serde(default, rename = "path", deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub hydrate: Option<String>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(skip)]
    pub builtin: Option<Builtin>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

impl ColumnDef {
    fn builtin(name: &str, column_type: ColumnType, builtin: Builtin, description: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            description: description.to_string(),
            paths: Vec::new(),
            hydrate: None,
            transform: None,
            builtin: Some(builtin),
        }
    }
}

/// Pagination style of a list action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Pagination {
    /// `PageNumber`/`PageSize`, stop once `total_field` items were seen
    PageNumber {
        #[serde(default = "default_page_size")]
        page_size: u32,
        #[serde(default = "default_total_field")]
        total_field: String,
    },
    /// `Marker`/`MaxItems`, stop when `IsTruncated` is false
    Marker {
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
    /// `NextToken`/`MaxResults`, stop when no token comes back
    NextToken {
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
    /// Single call
    #[default]
    None,
}

fn default_page_size() -> u32 {
    50
}

fn default_total_field() -> String {
    "TotalCount".to_string()
}

/// List action
#[derive(Debug, Clone, Deserialize)]
pub struct ListDef {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Dot path of the item array in the response
    pub response_path: String,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Get action, used when the key column is qualified
#[derive(Debug, Clone, Deserialize)]
pub struct GetDef {
    pub key_column: String,
    pub action: String,
    /// Parameter templates; `{key}` is the qualified value
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub response_path: String,
    /// Error codes meaning "no such item"
    #[serde(default)]
    pub not_found_codes: Vec<String>,
}

/// Detail call made per item
#[derive(Debug, Clone, Deserialize)]
pub struct HydrateDef {
    pub action: String,
    /// Parameter templates; `{Field}` reads the item
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Dot path of the interesting part of the response (whole response when absent)
    #[serde(default)]
    pub response_path: Option<String>,
    #[serde(default)]
    pub not_found_codes: Vec<String>,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    #[serde(skip)]
    pub name: String,
    pub description: String,
    pub service: Service,
    /// Global tables run once instead of once per region
    #[serde(default)]
    pub is_global: bool,
    pub list: ListDef,
    #[serde(default)]
    pub get: Option<GetDef>,
    #[serde(default)]
    pub hydrates: HashMap<String, HydrateDef>,
    /// Template for the `title` column
    #[serde(default)]
    pub title: Option<String>,
    /// Template for the single `akas` entry
    #[serde(default)]
    pub aka: Option<String>,
    /// Retry `Throttling*` errors with exponential backoff
    #[serde(default)]
    pub retry_throttling: bool,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether shaping this column needs the account hydrate
    pub fn column_needs_account(&self, column: &ColumnDef) -> bool {
        match column.builtin {
            Some(Builtin::AccountId) => true,
            Some(Builtin::Akas) => self.aka.as_deref().is_some_and(|t| t.contains("{account_id}")),
            Some(Builtin::Title) => self.title.as_deref().is_some_and(|t| t.contains("{account_id}")),
            _ => column.hydrate.as_deref() == Some(ACCOUNT_HYDRATE),
        }
    }

    /// Append the common columns
    fn add_common_columns(&mut self) {
        if self.title.is_some() {
            self.columns.push(ColumnDef::builtin(
                "title",
                ColumnType::String,
                Builtin::Title,
                "Title of the resource.",
            ));
        }
        if self.aka.is_some() {
            self.columns.push(ColumnDef::builtin(
                "akas",
                ColumnType::Json,
                Builtin::Akas,
                "Array of globally unique identifier strings (also known as) for the resource.",
            ));
        }
        if !self.is_global {
            self.columns.push(ColumnDef::builtin(
                "region",
                ColumnType::String,
                Builtin::Region,
                "The Alibaba Cloud region in which the resource is located.",
            ));
        }
        self.columns.push(ColumnDef::builtin(
            "account_id",
            ColumnType::String,
            Builtin::AccountId,
            "The Alibaba Cloud Account ID in which the resource is located.",
        ));
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub tables: HashMap<String, TableDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<TableConfig> = OnceLock::new();

/// Parse one table file and finish its definitions
pub fn parse_tables(content: &str) -> Result<TableConfig, serde_json::Error> {
    let mut config: TableConfig = serde_json::from_str(content)?;
    for (name, table) in config.tables.iter_mut() {
        table.name = name.clone();
        table.add_common_columns();
    }
    Ok(config)
}

/// Get the table registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static TableConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = TableConfig {
            tables: HashMap::new(),
        };

        for content in TABLE_FILES {
            let partial = parse_tables(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded table JSON: {}", e));
            final_config.tables.extend(partial.tables);
        }

        final_config
    })
}

/// Get a table definition by name
pub fn get_table(name: &str) -> Option<&'static TableDef> {
    get_registry().tables.get(name)
}

/// Get all table names, sorted
pub fn get_all_table_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = get_registry()
        .tables
        .keys()
        .map(|s| s.as_str())
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(!registry.tables.is_empty(), "Registry should have tables");
    }

    #[test]
    fn test_ecs_instance_table_exists() {
        let table = get_table("alicloud_ecs_instance").expect("ECS instance table should exist");
        assert_eq!(table.service, Service::Ecs);
        assert_eq!(table.list.action, "DescribeInstances");
        assert!(table.get.is_some());
        assert!(table.column("instance_id").is_some());
    }

    #[test]
    fn test_common_columns_added() {
        let table = get_table("alicloud_vpc").unwrap();
        for name in ["title", "akas", "region", "account_id"] {
            assert!(table.column(name).is_some(), "missing {}", name);
        }

        let global = get_table("alicloud_ram_user").unwrap();
        assert!(global.is_global);
        assert!(global.column("region").is_none());
        assert!(global.column("account_id").is_some());
    }

    #[test]
    fn test_every_hydrate_reference_is_defined() {
        for (name, table) in &get_registry().tables {
            for column in &table.columns {
                if let Some(hydrate) = column.hydrate.as_deref() {
                    assert!(
                        hydrate == ACCOUNT_HYDRATE || table.hydrates.contains_key(hydrate),
                        "{}.{} references unknown hydrate {}",
                        name,
                        column.name,
                        hydrate
                    );
                }
            }
            if let Some(get) = &table.get {
                assert!(
                    table.column(&get.key_column).is_some(),
                    "{} get key column {} is not a column",
                    name,
                    get.key_column
                );
            }
        }
    }

    #[test]
    fn test_column_names_unique() {
        for (name, table) in &get_registry().tables {
            let mut seen = std::collections::HashSet::new();
            for column in &table.columns {
                assert!(seen.insert(&column.name), "{} has duplicate column {}", name, column.name);
            }
        }
    }

    #[test]
    fn test_single_network_interface_table() {
        let names = get_all_table_names();
        assert_eq!(names.iter().filter(|n| n.contains("network_interface") || n.ends_with("_eni")).count(), 1);
    }

    #[test]
    fn test_aka_needs_account() {
        let table = get_table("alicloud_ecs_instance").unwrap();
        let akas = table.column("akas").unwrap();
        assert!(table.column_needs_account(akas));
        let id = table.column("instance_id").unwrap();
        assert!(!table.column_needs_account(id));
    }

    #[test]
    fn test_parse_pagination_styles() {
        let config = parse_tables(
            r#"{"tables": {"t": {
                "description": "test",
                "service": "ram",
                "is_global": true,
                "list": {"action": "ListUsers", "response_path": "Users.User",
                         "pagination": {"style": "marker", "page_size": 100}},
                "columns": [{"name": "user_name", "type": "string", "path": "UserName"}]
            }}}"#,
        )
        .unwrap();
        let table = &config.tables["t"];
        assert_eq!(table.name, "t");
        assert_eq!(table.list.pagination, Pagination::Marker { page_size: 100 });
        assert_eq!(table.columns[0].paths, vec!["UserName".to_string()]);
    }

    #[test]
    fn test_kms_key_arn_falls_back_to_describe_shape() {
        let table = get_table("alicloud_kms_key").unwrap();
        let arn = table.column("arn").unwrap();
        assert_eq!(arn.paths, vec!["KeyArn".to_string(), "Arn".to_string()]);
        assert!(table.column_needs_account(table.column("akas").unwrap()));
    }
}
