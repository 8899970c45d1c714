//! Resource Fetcher
//!
//! Runs list and get actions against a [`PageSource`], paginating per the
//! table's pagination style and streaming items into an [`ItemSink`].

use super::registry::{GetDef, ListDef, Pagination};
use super::transform::{extract_items, lookup_path, render_template, RowContext};
use crate::alicloud::client::{Params, ServiceClient};
use crate::alicloud::error::api_error;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Something that answers RPC actions
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, action: &str, params: &Params) -> Result<Value>;
}

/// A service client, optionally retrying throttled calls
pub struct ClientSource<'a> {
    pub client: &'a ServiceClient,
    pub retry_throttling: bool,
}

#[async_trait]
impl PageSource for ClientSource<'_> {
    async fn fetch_page(&self, action: &str, params: &Params) -> Result<Value> {
        if self.retry_throttling {
            self.client.call_with_throttling_retry(action, params).await
        } else {
            self.client.call(action, params).await
        }
    }
}

/// Receives streamed items
#[async_trait]
pub trait ItemSink: Send {
    /// Accept one item; returning `false` stops the listing
    async fn push(&mut self, item: Value) -> Result<bool>;
}

#[async_trait]
impl ItemSink for Vec<Value> {
    async fn push(&mut self, item: Value) -> Result<bool> {
        Vec::push(self, item);
        Ok(true)
    }
}

/// Read a count that may come back as a number or a numeric string
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Stream every item of a list action. Returns the number of items pushed.
///
/// Pages are requested until the style's end condition holds, a page comes
/// back empty, or the sink asks to stop.
pub async fn list_items(
    source: &dyn PageSource,
    list: &ListDef,
    sink: &mut dyn ItemSink,
) -> Result<usize> {
    let mut params: Params = list.params.clone();
    let mut streamed = 0usize;
    let mut seen = 0u64;
    let mut page = 1u32;

    loop {
        match &list.pagination {
            Pagination::PageNumber { page_size, .. } => {
                params.insert("PageNumber".to_string(), page.to_string());
                params.insert("PageSize".to_string(), page_size.to_string());
            }
            Pagination::Marker { page_size } => {
                params.insert("MaxItems".to_string(), page_size.to_string());
            }
            Pagination::NextToken { page_size } => {
                params.insert("MaxResults".to_string(), page_size.to_string());
            }
            Pagination::None => {}
        }

        tracing::debug!("{} page {}", list.action, page);
        let response = source.fetch_page(&list.action, &params).await?;
        let items = extract_items(&response, &list.response_path);
        let count = items.len();

        for item in items {
            if !sink.push(item).await? {
                tracing::debug!("{}: sink satisfied after {} items", list.action, streamed);
                return Ok(streamed);
            }
            streamed += 1;
        }
        seen += count as u64;

        if count == 0 {
            break;
        }

        match &list.pagination {
            Pagination::PageNumber {
                page_size,
                total_field,
            } => {
                let total = lookup_path(&response, total_field).and_then(as_count);
                let done = match total {
                    Some(total) => seen >= total,
                    None => count < *page_size as usize,
                };
                if done {
                    break;
                }
                page += 1;
            }
            Pagination::Marker { .. } => {
                let truncated = response.get("IsTruncated").is_some_and(as_flag);
                let marker = non_empty_str(response.get("Marker"));
                match (truncated, marker) {
                    (true, Some(marker)) => {
                        params.insert("Marker".to_string(), marker);
                        page += 1;
                    }
                    _ => break,
                }
            }
            Pagination::NextToken { .. } => match non_empty_str(response.get("NextToken")) {
                Some(token) => {
                    params.insert("NextToken".to_string(), token);
                    page += 1;
                }
                None => break,
            },
            Pagination::None => break,
        }
    }

    tracing::debug!("{}: {} items over {} pages", list.action, streamed, page);
    Ok(streamed)
}

/// Fetch one item by key. `None` means the item does not exist.
pub async fn get_item(
    source: &dyn PageSource,
    get: &GetDef,
    key: &str,
    ctx: &RowContext<'_>,
) -> Result<Option<Value>> {
    let params: Params = get
        .params
        .iter()
        .map(|(k, template)| (k.clone(), render_template(template, &Value::Null, ctx, Some(key))))
        .collect();

    let response = match source.fetch_page(&get.action, &params).await {
        Ok(response) => response,
        Err(e) if api_error(&e).is_some_and(|api| api.is_code_in(&get.not_found_codes)) => {
            tracing::debug!("{} {}: not found", get.action, key);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    Ok(extract_items(&response, &get.response_path).into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Pages `total` synthetic items, recording every request
    struct FakePager {
        total: usize,
        requests: Mutex<Vec<Params>>,
    }

    impl FakePager {
        fn new(total: usize) -> Self {
            Self {
                total,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageSource for FakePager {
        async fn fetch_page(&self, _action: &str, params: &Params) -> Result<Value> {
            self.requests.lock().unwrap().push(params.clone());

            let page: usize = params.get("PageNumber").map_or(1, |p| p.parse().unwrap());
            let size: usize = params
                .get("PageSize")
                .or_else(|| params.get("MaxItems"))
                .map_or(self.total, |p| p.parse().unwrap());
            let offset = match params.get("Marker") {
                Some(marker) => marker.parse().unwrap(),
                None => (page - 1) * size,
            };
            let end = (offset + size).min(self.total);
            let items: Vec<Value> = (offset..end).map(|i| json!({"Id": i})).collect();
            let truncated = end < self.total;
            let marker = if truncated { end.to_string() } else { String::new() };

            Ok(json!({
                "TotalCount": self.total,
                "Items": {"Item": items},
                "IsTruncated": truncated,
                "Marker": marker,
            }))
        }
    }

    fn list_def(pagination: Pagination) -> ListDef {
        ListDef {
            action: "DescribeThings".to_string(),
            params: BTreeMap::new(),
            response_path: "Items.Item".to_string(),
            pagination,
        }
    }

    fn page_number(page_size: u32) -> Pagination {
        Pagination::PageNumber {
            page_size,
            total_field: "TotalCount".to_string(),
        }
    }

    /// Stops after `limit` items
    struct LimitSink {
        items: Vec<Value>,
        limit: usize,
    }

    #[async_trait]
    impl ItemSink for LimitSink {
        async fn push(&mut self, item: Value) -> Result<bool> {
            if self.items.len() >= self.limit {
                return Ok(false);
            }
            self.items.push(item);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_page_number_125_items_takes_3_pages() {
        let pager = FakePager::new(125);
        let mut items: Vec<Value> = Vec::new();

        let streamed = list_items(&pager, &list_def(page_number(50)), &mut items).await.unwrap();

        assert_eq!(streamed, 125);
        assert_eq!(items.len(), 125);
        assert_eq!(pager.request_count(), 3);
        assert_eq!(items[124]["Id"], json!(124));
    }

    #[tokio::test]
    async fn test_page_number_exact_multiple() {
        let pager = FakePager::new(100);
        let mut items: Vec<Value> = Vec::new();
        list_items(&pager, &list_def(page_number(50)), &mut items).await.unwrap();
        assert_eq!(items.len(), 100);
        assert_eq!(pager.request_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_listing_takes_one_request() {
        let pager = FakePager::new(0);
        let mut items: Vec<Value> = Vec::new();
        list_items(&pager, &list_def(page_number(50)), &mut items).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(pager.request_count(), 1);
    }

    #[tokio::test]
    async fn test_sink_stops_listing_early() {
        let pager = FakePager::new(125);
        let mut sink = LimitSink {
            items: Vec::new(),
            limit: 10,
        };

        let streamed = list_items(&pager, &list_def(page_number(50)), &mut sink).await.unwrap();

        assert_eq!(streamed, 10);
        assert_eq!(pager.request_count(), 1);
    }

    #[tokio::test]
    async fn test_marker_pagination() {
        let pager = FakePager::new(250);
        let mut items: Vec<Value> = Vec::new();

        list_items(&pager, &list_def(Pagination::Marker { page_size: 100 }), &mut items)
            .await
            .unwrap();

        assert_eq!(items.len(), 250);
        let requests = pager.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].get("Marker").is_none());
        assert_eq!(requests[2].get("Marker").map(String::as_str), Some("200"));
    }

    #[tokio::test]
    async fn test_single_call() {
        let pager = FakePager::new(7);
        let mut items: Vec<Value> = Vec::new();
        list_items(&pager, &list_def(Pagination::None), &mut items).await.unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(pager.request_count(), 1);
    }

    struct TokenPager;

    #[async_trait]
    impl PageSource for TokenPager {
        async fn fetch_page(&self, _action: &str, params: &Params) -> Result<Value> {
            Ok(match params.get("NextToken").map(String::as_str) {
                None => json!({"NetworkInterfaceSets": {"NetworkInterfaceSet": [{"Id": 1}, {"Id": 2}]}, "NextToken": "t2"}),
                Some("t2") => json!({"NetworkInterfaceSets": {"NetworkInterfaceSet": [{"Id": 3}]}, "NextToken": ""}),
                Some(other) => panic!("unexpected token {}", other),
            })
        }
    }

    #[tokio::test]
    async fn test_next_token_pagination() {
        let list = ListDef {
            action: "DescribeNetworkInterfaces".to_string(),
            params: BTreeMap::new(),
            response_path: "NetworkInterfaceSets.NetworkInterfaceSet".to_string(),
            pagination: Pagination::NextToken { page_size: 2 },
        };
        let mut items: Vec<Value> = Vec::new();
        list_items(&TokenPager, &list, &mut items).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    struct NotFound;

    #[async_trait]
    impl PageSource for NotFound {
        async fn fetch_page(&self, action: &str, _params: &Params) -> Result<Value> {
            Err(crate::alicloud::ApiError::from_response(
                "RamService",
                action,
                404,
                r#"{"Code":"EntityNotExist.User","Message":"The user does not exist."}"#,
            )
            .into())
        }
    }

    #[tokio::test]
    async fn test_get_not_found_is_none() {
        let get = GetDef {
            key_column: "name".to_string(),
            action: "GetUser".to_string(),
            params: [("UserName".to_string(), "{key}".to_string())].into_iter().collect(),
            response_path: "User".to_string(),
            not_found_codes: vec!["EntityNotExist.User".to_string()],
        };
        let ctx = RowContext {
            region: "cn-hangzhou",
            account_id: None,
        };
        assert!(get_item(&NotFound, &get, "ghost", &ctx).await.unwrap().is_none());

        let strict = GetDef {
            not_found_codes: Vec::new(),
            ..get
        };
        assert!(get_item(&NotFound, &strict, "ghost", &ctx).await.is_err());
    }
}
