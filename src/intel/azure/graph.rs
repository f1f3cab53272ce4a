//! Azure Resource Graph queries through `az graph query`.

use super::cli;
use crate::config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PAGE_SIZE: u32 = 100;

/// One page of `az graph query --output json`.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Page {
    pub data: Vec<Value>,
    pub skip_token: Option<String>,
    pub total_records: Option<u32>,
    pub count: i32,
}

fn build_command(query: &str, subscription_id: Option<&str>, skip_token: Option<&str>) -> String {
    let mut cmd = format!("az graph query --first {PAGE_SIZE}");
    if let Some(subscription_id) = subscription_id {
        cmd.push_str(&format!(" --subscriptions {subscription_id}"));
    }
    if let Some(token) = skip_token {
        cmd.push_str(&format!(" --skip-token {token}"));
    }
    cmd.push_str(&format!(" -q '{query}' --output json"));
    cmd
}

/// Parses one page, reporting the JSON path of any mismatch.
pub fn parse_page(output: &str, page_num: usize) -> Result<Page> {
    let mut deserializer = serde_json::Deserializer::from_str(output);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        log::error!("OUTPUT START:\n\n{}\n\nOUTPUT END\n", output);
        Error::Vendor(format!(
            "Error parsing Resource Graph page {page_num}: path={} error={}",
            e.path(),
            e
        ))
    })
}

/// Runs `query` and follows skip tokens until every page is read.
///
/// Blocking; call it from `spawn_blocking` inside async code.
pub fn run_resource_graph_query(query: &str, subscription_id: Option<&str>) -> Result<Vec<Value>> {
    let mut rows: Vec<Value> = Vec::new();
    let mut skip_token: Option<String> = None;
    let mut page_num = 0;
    let mut total_records = None;

    loop {
        let output = cli::run(&build_command(query, subscription_id, skip_token.as_deref()))?;
        let page = parse_page(&output, page_num)?;

        if page.skip_token.is_some() && page.skip_token == skip_token {
            return Err(Error::Vendor(
                "Skip token not unique - possible infinite loop".to_string(),
            ));
        }
        if page.total_records.is_some() {
            total_records = page.total_records;
        }
        rows.extend(page.data);
        log::info!(
            "got page#{page_num:2} record_count=+{count:3} => {total:3}",
            count = page.count,
            total = rows.len(),
        );

        page_num += 1;
        match page.skip_token {
            Some(token) => {
                skip_token = Some(token);
                std::thread::sleep(std::time::Duration::from_millis(config::SLEEP_MSEC));
            }
            None => break,
        }
    }

    if let Some(total) = total_records {
        if total as usize != rows.len() {
            log::warn!("Resource Graph reported {total} records but returned {}", rows.len());
        }
    }
    Ok(rows)
}
