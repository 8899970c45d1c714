//! Hydrate functions
//!
//! Per-item detail calls that populate columns the list action does not
//! return. Only the hydrates behind the requested columns are run.

use super::fetcher::PageSource;
use super::registry::{ColumnDef, HydrateDef, TableDef, ACCOUNT_HYDRATE};
use super::transform::{lookup_path, render_template, RowContext};
use crate::alicloud::client::Params;
use crate::alicloud::error::api_error;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;

/// What the requested columns need beyond the list item
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HydratePlan<'a> {
    pub account: bool,
    pub calls: Vec<&'a str>,
}

/// Work out which hydrates the columns depend on
pub fn plan<'a>(table: &'a TableDef, columns: &[&'a ColumnDef]) -> HydratePlan<'a> {
    let mut plan = HydratePlan::default();
    for column in columns {
        if table.column_needs_account(column) {
            plan.account = true;
        }
        if let Some(name) = column.hydrate.as_deref() {
            if name != ACCOUNT_HYDRATE && !plan.calls.contains(&name) {
                plan.calls.push(name);
            }
        }
    }
    plan
}

/// Run one hydrate for an item. Not-found codes yield `Value::Null`.
pub async fn run_hydrate(
    source: &dyn PageSource,
    def: &HydrateDef,
    item: &Value,
    ctx: &RowContext<'_>,
) -> Result<Value> {
    let params: Params = def
        .params
        .iter()
        .map(|(k, template)| (k.clone(), render_template(template, item, ctx, None)))
        .collect();

    let response = match source.fetch_page(&def.action, &params).await {
        Ok(response) => response,
        Err(e) if api_error(&e).is_some_and(|api| api.is_code_in(&def.not_found_codes)) => {
            tracing::debug!("{}: item gone, leaving columns empty", def.action);
            return Ok(Value::Null);
        }
        Err(e) => return Err(e),
    };

    Ok(match def.response_path.as_deref() {
        Some(path) => lookup_path(&response, path).cloned().unwrap_or(Value::Null),
        None => response,
    })
}

/// Run the planned hydrates for one item concurrently
pub async fn hydrate_item(
    source: &dyn PageSource,
    table: &TableDef,
    calls: &[&str],
    item: &Value,
    ctx: &RowContext<'_>,
) -> Result<HashMap<String, Value>> {
    let results = try_join_all(calls.iter().map(|name| async move {
        let def = table
            .hydrates
            .get(*name)
            .with_context(|| format!("{}: unknown hydrate {}", table.name, name))?;
        let value = run_hydrate(source, def, item, ctx)
            .await
            .with_context(|| format!("{}: hydrate {} failed", table.name, name))?;
        Ok::<_, anyhow::Error>((name.to_string(), value))
    }))
    .await?;

    Ok(results.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::registry::get_table;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RamFake {
        actions: Mutex<Vec<(String, Params)>>,
    }

    #[async_trait]
    impl PageSource for RamFake {
        async fn fetch_page(&self, action: &str, params: &Params) -> Result<Value> {
            self.actions
                .lock()
                .unwrap()
                .push((action.to_string(), params.clone()));
            match action {
                "GetUser" => Ok(json!({"User": {"UserName": params["UserName"], "LastLoginDate": "2026-01-02T03:04:05Z"}})),
                "ListGroupsForUser" => Ok(json!({"Groups": {"Group": [{"GroupName": "admins"}]}})),
                "ListPoliciesForUser" => Ok(json!({"Policies": {"Policy": []}})),
                "GetUserMFAInfo" => Err(crate::alicloud::ApiError::from_response(
                    "RamService",
                    action,
                    404,
                    r#"{"Code":"EntityNotExist.User.MFADevice"}"#,
                )
                .into()),
                other => panic!("unexpected action {}", other),
            }
        }
    }

    #[test]
    fn test_plan_only_requested_hydrates() {
        let table = get_table("alicloud_ram_user").unwrap();
        let columns: Vec<&ColumnDef> = ["name", "groups", "akas"]
            .iter()
            .map(|c| table.column(c).unwrap())
            .collect();

        let hydrates = plan(table, &columns);
        assert!(hydrates.account);
        assert_eq!(hydrates.calls, vec!["list_groups"]);

        let just_name = plan_for(table, &["name"]);
        assert_eq!(just_name, HydratePlan::default());
    }

    fn plan_for<'a>(table: &'a TableDef, names: &[&str]) -> HydratePlan<'a> {
        let columns: Vec<&ColumnDef> = names.iter().map(|c| table.column(c).unwrap()).collect();
        plan(table, &columns)
    }

    #[tokio::test]
    async fn test_hydrate_item_runs_each_call_once() {
        let table = get_table("alicloud_ram_user").unwrap();
        let source = RamFake {
            actions: Mutex::new(Vec::new()),
        };
        let ctx = RowContext {
            region: "cn-hangzhou",
            account_id: Some("1234"),
        };
        let item = json!({"UserName": "alice"});

        let hydrated = hydrate_item(&source, table, &["get_user", "list_groups", "mfa_device"], &item, &ctx)
            .await
            .unwrap();

        assert_eq!(hydrated["get_user"]["LastLoginDate"], json!("2026-01-02T03:04:05Z"));
        assert_eq!(hydrated["list_groups"][0]["GroupName"], json!("admins"));
        assert_eq!(hydrated["mfa_device"], Value::Null);

        let actions = source.actions.lock().unwrap();
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|(_, params)| params["UserName"] == "alice"));
    }
}
