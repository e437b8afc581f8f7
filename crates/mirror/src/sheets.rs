use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::{MirrorClient, RangeWrite};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets v4 backend: one spreadsheet, one sheet per partition.
///
/// The OAuth handshake happens outside this crate; the bearer token and the
/// developer key arrive already resolved. Partition names are Kubernetes
/// namespaces (DNS labels), so ranges need no escaping.
pub struct SheetsMirror {
    http: reqwest::Client,
    spreadsheet_id: String,
    api_key: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValuesBody {
    #[serde(default)]
    values: Vec<Vec<Json>>,
}

fn cell_text(v: Json) -> String {
    match v {
        Json::String(s) => s,
        other => other.to_string(),
    }
}

impl SheetsMirror {
    pub fn new(spreadsheet_id: impl Into<String>, api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}{}", API_BASE, self.spreadsheet_id, suffix)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.access_token).query(&[("key", self.api_key.as_str())])
    }

    async fn sheet_meta(&self) -> Result<SpreadsheetMeta> {
        let resp = self
            .authed(self.http.get(self.url("")))
            .query(&[("fields", "sheets.properties")])
            .send()
            .await
            .context("fetching spreadsheet metadata")?
            .error_for_status()
            .context("fetching spreadsheet metadata")?;
        resp.json().await.context("decoding spreadsheet metadata")
    }

    async fn batch_update(&self, requests: Vec<Json>) -> Result<()> {
        self.authed(self.http.post(self.url(":batchUpdate")))
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .context("spreadsheet batchUpdate")?
            .error_for_status()
            .context("spreadsheet batchUpdate")?;
        Ok(())
    }
}

#[async_trait]
impl MirrorClient for SheetsMirror {
    async fn list_partitions(&self) -> Result<Vec<String>> {
        let meta = self.sheet_meta().await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn create_partitions(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let requests = names
            .iter()
            .map(|n| serde_json::json!({"addSheet": {"properties": {"title": n}}}))
            .collect();
        self.batch_update(requests).await?;
        counter!("mirror_partitions_created_total", names.len() as u64);
        Ok(())
    }

    async fn delete_partitions(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        // Titles must be resolved to sheet ids first; titles already gone
        // (deleted by hand, or by a competing pass) are skipped.
        let meta = self.sheet_meta().await?;
        let ids: Vec<i64> = meta
            .sheets
            .iter()
            .filter(|s| names.contains(&s.properties.title))
            .map(|s| s.properties.sheet_id)
            .collect();
        if ids.is_empty() {
            debug!(requested = names.len(), "no matching partitions to delete");
            return Ok(());
        }
        let requests = ids
            .iter()
            .map(|id| serde_json::json!({"deleteSheet": {"sheetId": id}}))
            .collect();
        self.batch_update(requests).await?;
        counter!("mirror_partitions_deleted_total", ids.len() as u64);
        Ok(())
    }

    async fn read_range(&self, partition: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&format!("/values/{}!{}", partition, range));
        let resp = self
            .authed(self.http.get(url))
            .send()
            .await
            .with_context(|| format!("reading {}!{}", partition, range))?
            .error_for_status()
            .with_context(|| format!("reading {}!{}", partition, range))?;
        let body: ValuesBody = resp.json().await.context("decoding value range")?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_ranges(&self, partition: &str, writes: &[RangeWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let data: Vec<Json> = writes
            .iter()
            .map(|w| serde_json::json!({"range": format!("{}!{}", partition, w.range), "values": w.values}))
            .collect();
        self.authed(self.http.post(self.url("/values:batchUpdate")))
            .json(&serde_json::json!({"valueInputOption": "RAW", "data": data}))
            .send()
            .await
            .with_context(|| format!("writing {} ranges to {}", writes.len(), partition))?
            .error_for_status()
            .with_context(|| format!("writing {} ranges to {}", writes.len(), partition))?;
        counter!("mirror_range_writes_total", writes.len() as u64);
        Ok(())
    }
}
