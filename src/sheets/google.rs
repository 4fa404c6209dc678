//! Google Sheets v4 REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Connector, SheetRange, SheetStore};
use crate::config::ArmoryConfig;
use crate::error::{ArmoryError, ArmoryResult};
use crate::types::{BatchWrite, RangeOverwrite, RawGrid, SheetRef};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct UserInfo {
    email: String,
}

pub fn http_client() -> ArmoryResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Map a non-2xx response onto the error taxonomy.
async fn check(response: reqwest::Response, write: bool) -> ArmoryResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        warn!("Sheets API rejected the access token");
        return Err(ArmoryError::AuthExpired);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {}", status, body);
    if write {
        Err(ArmoryError::WriteFailed(message))
    } else {
        Err(ArmoryError::Fetch(message))
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn row_data(cells: &[String], width: usize) -> Value {
    let values: Vec<Value> = (0..width.max(cells.len()))
        .map(|i| {
            json!({ "userEnteredValue": { "stringValue": cells.get(i).cloned().unwrap_or_default() } })
        })
        .collect();
    json!({ "values": values })
}

fn overwrite_request(ow: &RangeOverwrite) -> Value {
    let width = ow
        .grid
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(ow.clear_cols);
    let height = ow.grid.len().max(ow.clear_rows);
    let rows: Vec<Value> = (0..height)
        .map(|r| row_data(ow.grid.get(r).map(Vec::as_slice).unwrap_or(&[]), width))
        .collect();
    json!({
        "updateCells": {
            "rows": rows,
            "fields": "userEnteredValue",
            "start": { "sheetId": ow.sheet_id, "rowIndex": 0, "columnIndex": 0 }
        }
    })
}

/// `batchUpdate` request list: overwrites, then cell updates, then appends.
pub fn batch_requests(batch: &BatchWrite) -> Vec<Value> {
    let mut requests = Vec::new();
    requests.extend(batch.overwrites.iter().map(overwrite_request));
    for update in &batch.updates {
        requests.push(json!({
            "updateCells": {
                "rows": [{ "values": [{ "userEnteredValue": { "stringValue": update.value } }] }],
                "fields": "userEnteredValue",
                "start": {
                    "sheetId": update.sheet_id,
                    "rowIndex": update.row,
                    "columnIndex": update.col
                }
            }
        }));
    }
    for group in &batch.appends {
        let rows: Vec<Value> = group.rows.iter().map(|r| row_data(r, 0)).collect();
        requests.push(json!({
            "appendCells": { "sheetId": group.sheet_id, "rows": rows, "fields": "*" }
        }));
    }
    requests
}

/// Spreadsheet client bound to one access token.
#[derive(Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    token: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &ArmoryConfig, token: impl Into<String>) -> ArmoryResult<Self> {
        Ok(Self::with_client(http_client()?, config, token))
    }

    pub fn with_client(
        http: reqwest::Client,
        config: &ArmoryConfig,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            token: token.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> ArmoryResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ArmoryError::Config(format!("api_base '{}': {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ArmoryError::Config(format!("api_base '{}'", self.api_base)))?
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str) -> ArmoryResult<Url> {
        self.url(&[self.spreadsheet_id.as_str(), "values", range])
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn fetch_range(&self, range: &SheetRange) -> ArmoryResult<RawGrid> {
        let a1 = range.to_string();
        debug!(range = %a1, "fetching range");
        let response = self
            .http
            .get(self.values_url(&a1)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ArmoryError::Fetch(e.to_string()))?;
        let body: ValueRange = check(response, false).await?.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: RawGrid) -> ArmoryResult<()> {
        debug!(sheet = %sheet.name, rows = rows.len(), "appending rows");
        let mut url = self.values_url(&format!("{}:append", sheet.range))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| ArmoryError::WriteFailed(e.to_string()))?;
        check(response, true).await?;
        Ok(())
    }

    async fn batch_write(&self, batch: BatchWrite) -> ArmoryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            updates = batch.updates.len(),
            appends = batch.appends.len(),
            overwrites = batch.overwrites.len(),
            "batch update"
        );
        let url = self.url(&[&format!("{}:batchUpdate", self.spreadsheet_id)])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "requests": batch_requests(&batch) }))
            .send()
            .await
            .map_err(|e| ArmoryError::WriteFailed(e.to_string()))?;
        check(response, true).await?;
        Ok(())
    }
}

/// Connector for the live spreadsheet; shares one HTTP pool across tokens.
#[derive(Clone)]
pub struct GoogleConnector {
    http: reqwest::Client,
    config: Arc<ArmoryConfig>,
}

impl GoogleConnector {
    pub fn new(config: Arc<ArmoryConfig>) -> ArmoryResult<Self> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }
}

#[async_trait]
impl Connector for GoogleConnector {
    async fn resolve_email(&self, token: &str) -> ArmoryResult<String> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ArmoryError::Fetch(e.to_string()))?;
        let info: UserInfo = check(response, false).await?.json().await?;
        Ok(info.email)
    }

    fn store(&self, token: &str) -> ArmoryResult<Arc<dyn SheetStore>> {
        Ok(Arc::new(GoogleSheetsClient::with_client(
            self.http.clone(),
            &self.config,
            token,
        )))
    }
}
