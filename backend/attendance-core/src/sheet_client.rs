// src/sheet_client.rs
//
// HTTP client for the spreadsheet-backed web app. Every operation is a GET
// with `action=<op>` plus its parameters; the response is a JSON envelope
// that signals failure with `ok: false` or an `error` field.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::SheetError;
use crate::payload::{value_is_truthy, value_to_text, LoginResult, RawPayload};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// --- Remote Source Seam ---

#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Identifies the endpoint in cache keys
    fn base_url(&self) -> &str;

    async fn list_sheets(&self, warehouse: &str) -> Result<Vec<String>, SheetError>;

    /// Empty `name_filter` returns every row
    async fn query_sheet(
        &self,
        warehouse: &str,
        sheet: &str,
        name_filter: &str,
    ) -> Result<RawPayload, SheetError>;

    async fn resolve_warehouse_id(&self, warehouse: &str) -> Result<String, SheetError>;

    async fn verify_login(&self, name: &str, code: &str) -> Result<LoginResult, SheetError>;

    async fn find_warehouse_by_name(&self, name: &str) -> Result<String, SheetError>;
}

// --- Response Envelope ---

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    msg: Option<String>,
}

impl Envelope {
    /// Failure when `ok` is false or `error` is truthy; `""`, `false`, `0`
    /// and `null` in `error` are not failures.
    fn failure(&self) -> Option<SheetError> {
        let error = self.error.as_ref().filter(|v| value_is_truthy(v));
        if self.ok != Some(false) && error.is_none() {
            return None;
        }
        // `error: true` carries no text of its own
        let error_text = error.filter(|v| !v.is_boolean()).map(value_to_text);
        Some(SheetError::application(error_text.or_else(|| self.msg.clone())))
    }
}

#[derive(Debug, Deserialize)]
struct SheetListResponse {
    #[serde(default)]
    sheets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WarehouseIdResponse {
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WarehouseLookupResponse {
    #[serde(default)]
    warehouse: Option<String>,
    #[serde(default)]
    warehouse_key: Option<String>,
}

// --- Client Implementation ---

#[derive(Clone)]
pub struct SheetClient {
    base_url: Option<String>,
    http_client: Client,
}

impl SheetClient {
    /// `base_url = None` builds a client whose every call fails with
    /// `SheetError::NotConfigured` without touching the network.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, SheetError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetError::Network {
                url: base_url.clone().unwrap_or_default(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        let base_url = base_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if base_url.is_none() {
            warn!("SHEET_API_URL is not set; remote sheet operations will fail");
        }
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn build_url(&self, action: &str, params: &[(&str, &str)]) -> Result<Url, SheetError> {
        let base = self.base_url.as_deref().ok_or(SheetError::NotConfigured)?;
        let mut url = Url::parse(base).map_err(|e| SheetError::Network {
            url: base.to_string(),
            message: format!("invalid endpoint URL: {}", e),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action);
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Sends the request and returns the raw JSON body after transport and
    /// HTTP status checks.
    async fn fetch_json(&self, action: &str, params: &[(&str, &str)]) -> Result<Value, SheetError> {
        let url = self.build_url(action, params)?;
        let url_text = url.to_string();
        debug!("Sending '{}' request to URL: {}", action, url_text);

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!("HTTP execution failed for '{}' (URL: {}): {}", action, url_text, e);
                SheetError::Network {
                    url: url_text.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        info!("Received response for '{}': Status={}", action, status);
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!(
                "Sheet API error response: Status={}, Body='{}' for URL: {}",
                status, body, url_text
            );
            return Err(SheetError::Http {
                status: status.as_u16(),
                url: url_text,
            });
        }

        let bytes = response.bytes().await.map_err(|e| SheetError::Network {
            url: url_text.clone(),
            message: format!("failed to read response body: {}", e),
        })?;
        serde_json::from_slice::<Value>(&bytes).map_err(|e| {
            error!("JSON decoding failed for '{}' (URL: {}): {}", action, url_text, e);
            SheetError::decode(format!("'{}' response", action), e)
        })
    }

    /// Like `fetch_json`, then rejects application-level failures and
    /// deserializes into `T`.
    async fn fetch_ok<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SheetError> {
        let body = self.fetch_json(action, params).await?;
        decode_ok(action, body)
    }
}

/// Rejects envelopes that report failure, then deserializes the body.
pub(crate) fn decode_ok<T: DeserializeOwned>(action: &str, body: Value) -> Result<T, SheetError> {
    let envelope: Envelope = serde_json::from_value(body.clone())
        .map_err(|e| SheetError::decode(format!("'{}' envelope", action), e))?;
    if let Some(failure) = envelope.failure() {
        warn!("Sheet API reported failure for '{}': {}", action, failure);
        return Err(failure);
    }
    serde_json::from_value(body).map_err(|e| SheetError::decode(format!("'{}' payload", action), e))
}

#[async_trait]
impl SheetSource for SheetClient {
    fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("")
    }

    async fn list_sheets(&self, warehouse: &str) -> Result<Vec<String>, SheetError> {
        let response: SheetListResponse = self
            .fetch_ok("sheets", &[("warehouse", warehouse)])
            .await?;
        Ok(response.sheets)
    }

    async fn query_sheet(
        &self,
        warehouse: &str,
        sheet: &str,
        name_filter: &str,
    ) -> Result<RawPayload, SheetError> {
        self.fetch_ok(
            "query",
            &[("warehouse", warehouse), ("sheet", sheet), ("name", name_filter)],
        )
        .await
    }

    async fn resolve_warehouse_id(&self, warehouse: &str) -> Result<String, SheetError> {
        let response: WarehouseIdResponse = self
            .fetch_ok("warehouseId", &[("warehouse", warehouse)])
            .await?;
        response
            .id
            .as_ref()
            .map(value_to_text)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SheetError::application(Some(format!("No spreadsheet id for warehouse '{}'", warehouse))))
    }

    async fn verify_login(&self, name: &str, code: &str) -> Result<LoginResult, SheetError> {
        // A refused login is a normal answer, so no envelope check here
        let body = self.fetch_json("login", &[("name", name), ("code", code)]).await?;
        serde_json::from_value(body).map_err(|e| SheetError::decode("'login' response", e))
    }

    async fn find_warehouse_by_name(&self, name: &str) -> Result<String, SheetError> {
        let response: WarehouseLookupResponse = self
            .fetch_ok("findWarehouse", &[("name", name)])
            .await?;
        response
            .warehouse
            .or(response.warehouse_key)
            .filter(|w| !w.trim().is_empty())
            .ok_or_else(|| SheetError::application(Some(format!("No warehouse found for '{}'", name))))
    }
}
