//! Column transforms
//!
//! Turns raw API items (plus hydrate results) into typed column values.

use super::registry::{Builtin, ColumnDef, ColumnType, TableDef, Transform, ACCOUNT_HYDRATE};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One output row: column name to value
pub type Row = Map<String, Value>;

/// Per-row values available to templates and builtin columns
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub region: &'a str,
    pub account_id: Option<&'a str>,
}

/// Walk a dot path (`Tags.Tag`, `Ipv6Sets.0`) through a JSON value
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => current.get(part)?,
        };
    }
    Some(current)
}

/// Items of a list response; a lone object counts as one item
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    match lookup_path(response, path) {
        Some(Value::Array(arr)) => arr.clone(),
        Some(obj @ Value::Object(_)) => vec![obj.clone()],
        _ => Vec::new(),
    }
}

/// Render a scalar as template text
fn template_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Render one placeholder. `name|json` yields the value as a JSON string literal.
fn placeholder(name: &str, item: &Value, ctx: &RowContext<'_>, key: Option<&str>) -> Option<String> {
    if let Some(inner) = name.strip_suffix("|json") {
        let text = placeholder(inner, item, ctx, key)?;
        return serde_json::to_string(&text).ok();
    }
    match name {
        "region" => Some(ctx.region.to_string()),
        "account_id" => ctx.account_id.map(str::to_string),
        "key" => key.map(str::to_string),
        _ => lookup_path(item, name).and_then(template_text),
    }
}

/// Walk a template, resolving each `{...}`. Stops at the first `None`.
fn render_with(template: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return Some(out);
        };
        out.push_str(&resolve(&rest[start + 1..start + len])?);
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    Some(out)
}

/// Render a template; `None` if any placeholder is unresolved
pub fn try_render_template(
    template: &str,
    item: &Value,
    ctx: &RowContext<'_>,
    key: Option<&str>,
) -> Option<String> {
    render_with(template, |name| placeholder(name, item, ctx, key))
}

/// Substitute `{region}`, `{account_id}`, `{key}` and `{Field.Path}` placeholders.
/// Unknown placeholders render as empty strings.
pub fn render_template(
    template: &str,
    item: &Value,
    ctx: &RowContext<'_>,
    key: Option<&str>,
) -> String {
    render_with(template, |name| Some(placeholder(name, item, ctx, key).unwrap_or_default()))
        .unwrap_or_default()
}

/// Convert a tag list into a map
fn tags_to_map(value: &Value) -> Value {
    let Some(tags) = value.as_array() else {
        return Value::Null;
    };

    let mut map = Map::new();
    for tag in tags {
        let key = tag.get("TagKey").or_else(|| tag.get("Key")).and_then(|v| v.as_str());
        let val = tag.get("TagValue").or_else(|| tag.get("Value")).cloned();
        if let Some(key) = key {
            map.insert(key.to_string(), val.unwrap_or(Value::Null));
        }
    }
    Value::Object(map)
}

pub fn apply_transform(transform: Transform, value: Value) -> Value {
    match transform {
        Transform::Tags => tags_to_map(&value),
        Transform::JsonString => {
            // Policy documents sometimes come back URL-encoded
            let parsed = value.as_str().filter(|s| !s.is_empty()).and_then(|s| {
                serde_json::from_str(s).ok().or_else(|| {
                    let decoded = urlencoding::decode(s).ok()?;
                    serde_json::from_str(&decoded).ok()
                })
            });
            parsed.unwrap_or(value)
        }
        Transform::Lowercase => match value {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other,
        },
        Transform::Count => match value {
            Value::Array(arr) => Value::from(arr.len()),
            Value::Null => Value::from(0),
            other => other,
        },
    }
}

/// Coerce a value to the declared column type; mismatches become null
pub fn coerce(column_type: ColumnType, value: Value) -> Value {
    match (column_type, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::Json, v) => v,
        (ColumnType::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Value::Number(n),
        (ColumnType::Int, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        (ColumnType::Double, Value::Number(n)) => Value::Number(n),
        (ColumnType::Double, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        (ColumnType::Bool, Value::Bool(b)) => Value::Bool(b),
        (ColumnType::Bool, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "enable" | "enabled" | "1" => Value::Bool(true),
            "false" | "off" | "no" | "disable" | "disabled" | "0" => Value::Bool(false),
            _ => Value::Null,
        },
        (ColumnType::Bool, Value::Number(n)) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
        (_, Value::String(s)) if s.is_empty() => Value::Null,
        (
            ColumnType::String | ColumnType::Timestamp | ColumnType::IpAddr | ColumnType::Cidr,
            Value::String(s),
        ) => Value::String(s),
        (ColumnType::String, Value::Number(n)) => Value::String(n.to_string()),
        (ColumnType::String, Value::Bool(b)) => Value::String(b.to_string()),
        _ => Value::Null,
    }
}

/// Compute one column
pub fn column_value(
    table: &TableDef,
    column: &ColumnDef,
    item: &Value,
    hydrated: &HashMap<String, Value>,
    ctx: &RowContext<'_>,
) -> Value {
    let raw = match column.builtin {
        Some(Builtin::Title) => table
            .title
            .as_deref()
            .and_then(|t| try_render_template(t, item, ctx, None))
            .map_or(Value::Null, Value::String),
        Some(Builtin::Akas) => table
            .aka
            .as_deref()
            .and_then(|t| try_render_template(t, item, ctx, None))
            .map_or(Value::Null, |aka| Value::Array(vec![Value::String(aka)])),
        Some(Builtin::Region) => Value::String(ctx.region.to_string()),
        Some(Builtin::AccountId) => ctx
            .account_id
            .map(|a| Value::String(a.to_string()))
            .unwrap_or(Value::Null),
        None => {
            let account;
            let source = match column.hydrate.as_deref() {
                Some(ACCOUNT_HYDRATE) => {
                    account = ctx.account_id.map_or(Value::Null, |a| Value::String(a.to_string()));
                    &account
                }
                Some(name) => hydrated.get(name).unwrap_or(&Value::Null),
                None => item,
            };
            if column.paths.is_empty() {
                source.clone()
            } else {
                // First path that resolves wins
                column
                    .paths
                    .iter()
                    .filter_map(|path| lookup_path(source, path))
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        }
    };

    let transformed = match column.transform {
        Some(transform) => apply_transform(transform, raw),
        None => raw,
    };
    coerce(column.column_type, transformed)
}

/// Build a row holding the given columns
pub fn shape_row(
    table: &TableDef,
    columns: &[&ColumnDef],
    item: &Value,
    hydrated: &HashMap<String, Value>,
    ctx: &RowContext<'_>,
) -> Row {
    columns
        .iter()
        .map(|column| (column.name.clone(), column_value(table, column, item, hydrated, ctx)))
        .collect()
}
