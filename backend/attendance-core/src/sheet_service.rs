// src/sheet_service.rs
//
// Cached front for a `SheetSource`: one request cache per remote operation,
// keyed by operation, endpoint and normalized parameters.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::SheetError;
use crate::normalize::{normalize, NormalizeOptions, NormalizedSheet};
use crate::payload::{LoginResult, RawPayload};
use crate::request_cache::{cache_key, exact_key, RequestCache};
use crate::sheet_client::SheetSource;

pub const SHEET_LIST_TTL: Duration = Duration::from_secs(5 * 60);
pub const SHEET_QUERY_TTL: Duration = Duration::from_secs(2 * 60);
pub const WAREHOUSE_ID_TTL: Duration = Duration::from_secs(10 * 60);
pub const NAME_LOOKUP_TTL: Duration = Duration::from_secs(10 * 60);

pub struct SheetService {
    source: Arc<dyn SheetSource>,
    sheets: RequestCache<Vec<String>>,
    queries: RequestCache<RawPayload>,
    warehouse_ids: RequestCache<String>,
    name_lookups: RequestCache<String>,
    logins: RequestCache<LoginResult>,
}

impl SheetService {
    pub fn new(source: Arc<dyn SheetSource>) -> Self {
        Self {
            source,
            sheets: RequestCache::new("listSheets", SHEET_LIST_TTL),
            queries: RequestCache::new("querySheet", SHEET_QUERY_TTL),
            warehouse_ids: RequestCache::new("resolveWarehouseId", WAREHOUSE_ID_TTL),
            name_lookups: RequestCache::new("findWarehouseByName", NAME_LOOKUP_TTL),
            logins: RequestCache::uncached("verifyLogin"),
        }
    }

    pub fn source(&self) -> &Arc<dyn SheetSource> {
        &self.source
    }

    fn key(&self, operation: &str, params: &[&str]) -> String {
        cache_key(operation, self.source.base_url(), params)
    }

    pub async fn list_sheets(&self, warehouse: &str) -> Result<Vec<String>, SheetError> {
        let key = self.key("listSheets", &[warehouse]);
        self.sheets
            .get_or_fetch(&key, || self.source.list_sheets(warehouse))
            .await
    }

    pub async fn query_sheet(
        &self,
        warehouse: &str,
        sheet: &str,
        name_filter: &str,
    ) -> Result<RawPayload, SheetError> {
        let key = self.key("querySheet", &[warehouse, sheet, name_filter]);
        self.queries
            .get_or_fetch(&key, || self.source.query_sheet(warehouse, sheet, name_filter))
            .await
    }

    pub async fn resolve_warehouse_id(&self, warehouse: &str) -> Result<String, SheetError> {
        let key = self.key("resolveWarehouseId", &[warehouse]);
        self.warehouse_ids
            .get_or_fetch(&key, || self.source.resolve_warehouse_id(warehouse))
            .await
    }

    pub async fn verify_login(&self, name: &str, code: &str) -> Result<LoginResult, SheetError> {
        // Never normalized: a differently padded code must not share a result
        let key = exact_key("verifyLogin", self.source.base_url(), &[name, code]);
        self.logins
            .get_or_fetch(&key, || self.source.verify_login(name, code))
            .await
    }

    pub async fn find_warehouse_by_name(&self, name: &str) -> Result<String, SheetError> {
        let key = self.key("findWarehouseByName", &[name]);
        self.name_lookups
            .get_or_fetch(&key, || self.source.find_warehouse_by_name(name))
            .await
    }

    /// Queries (through the cache) and normalizes one sheet.
    pub async fn load_sheet(
        &self,
        warehouse: &str,
        sheet: &str,
        name_filter: &str,
        options: &NormalizeOptions,
    ) -> Result<NormalizedSheet, SheetError> {
        let payload = self.query_sheet(warehouse, sheet, name_filter).await?;
        let normalized = normalize(&payload, options);
        info!(
            "Loaded sheet '{}' for warehouse '{}': {} rows, {} date columns",
            sheet,
            warehouse,
            normalized.rows.len(),
            normalized.date_columns.len()
        );
        Ok(normalized)
    }
}
