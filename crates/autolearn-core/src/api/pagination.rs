//! Aggregation over paged list endpoints.
//!
//! The portal exposes no "has more" flag, so a page holding fewer records
//! than requested is taken as the last page. A server that returns a short
//! page before the end of the data will be under-fetched.

use serde_json::{Map, Value};
use tracing::debug;

use super::client::ApiClient;
use crate::error::AppError;

/// Request field carrying the one-based page number.
pub const PAGE_NUM_KEY: &str = "appPageNum";
/// Request field carrying the page size.
pub const PAGE_SIZE_KEY: &str = "appPageSize";
/// Response field holding the page's records.
pub const ROWS_KEY: &str = "rows";
/// Response field holding the server's declared total.
pub const TOTAL_KEY: &str = "total";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSet {
    pub records: Vec<Value>,
    /// Total declared by the first page. Informational only.
    pub declared_total: Option<u64>,
    pub pages: u32,
}

pub struct Paginator<'a> {
    client: &'a ApiClient,
    page_size: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a ApiClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    /// Fetch pages 1, 2, ... until a short page, concatenating records in order.
    /// The first failed page aborts the whole aggregation.
    pub async fn fetch_all(
        &self,
        endpoint: &str,
        fixed_params: &Map<String, Value>,
    ) -> Result<PageSet, AppError> {
        let mut set = PageSet::default();
        let mut page_num: u32 = 1;

        loop {
            let mut body = fixed_params.clone();
            body.insert(PAGE_NUM_KEY.to_string(), Value::from(page_num));
            body.insert(PAGE_SIZE_KEY.to_string(), Value::from(self.page_size));

            let payload = self
                .client
                .post(endpoint, Value::Object(body))
                .await
                .into_result()?;

            if page_num == 1 {
                set.declared_total = payload.get(TOTAL_KEY).and_then(as_count);
            }
            let rows = match payload.get(ROWS_KEY) {
                Some(Value::Array(rows)) => rows.clone(),
                _ => Vec::new(),
            };
            let count = rows.len();
            set.records.extend(rows);
            set.pages += 1;
            debug!(endpoint, page = page_num, count, "Fetched page");

            if count < self.page_size as usize {
                return Ok(set);
            }
            page_num += 1;
        }
    }
}

/// Read a count that may arrive as a number or a numeric string.
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
