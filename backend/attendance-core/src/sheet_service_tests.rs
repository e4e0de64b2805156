// src/sheet_service_tests.rs

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{advance, sleep};

    use crate::error::SheetError;
    use crate::normalize::NormalizeOptions;
    use crate::payload::{LoginResult, RawPayload, RawRow};
    use crate::sheet_client::SheetSource;
    use crate::sheet_service::*;

    // --- In-memory Source ---

    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub payloads: HashMap<String, RawPayload>,
        pub sheet_names: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl MemorySource {
        pub fn with_sheet(sheet: &str, payload: RawPayload) -> Self {
            let mut payloads = HashMap::new();
            payloads.insert(sheet.to_string(), payload);
            Self {
                payloads,
                sheet_names: vec![sheet.to_string()],
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[async_trait]
    impl SheetSource for MemorySource {
        fn base_url(&self) -> &str {
            "memory://sheets"
        }

        async fn list_sheets(&self, _warehouse: &str) -> Result<Vec<String>, SheetError> {
            self.hit().await;
            Ok(self.sheet_names.clone())
        }

        async fn query_sheet(
            &self,
            _warehouse: &str,
            sheet: &str,
            _name_filter: &str,
        ) -> Result<RawPayload, SheetError> {
            self.hit().await;
            self.payloads
                .get(sheet)
                .cloned()
                .ok_or_else(|| SheetError::Application(format!("找不到工作表: {}", sheet)))
        }

        async fn resolve_warehouse_id(&self, warehouse: &str) -> Result<String, SheetError> {
            self.hit().await;
            Ok(format!("id-{}", warehouse.trim().to_lowercase()))
        }

        async fn verify_login(&self, name: &str, code: &str) -> Result<LoginResult, SheetError> {
            self.hit().await;
            let ok = code == "0101";
            Ok(LoginResult {
                ok,
                msg: if ok { None } else { Some("驗證碼錯誤".to_string()) },
                is_admin: Some(false),
                name: Some(name.to_string()),
                warehouse_key: ok.then(|| "TP01".to_string()),
            })
        }

        async fn find_warehouse_by_name(&self, _name: &str) -> Result<String, SheetError> {
            self.hit().await;
            Ok("TP01".to_string())
        }
    }

    pub(crate) fn march_schedule() -> RawPayload {
        RawPayload {
            headers: vec!["姓名".into(), "3/1".into(), "3/2".into()],
            headers_iso: Some(vec!["".into(), "2025-03-01".into(), "2025-03-02".into()]),
            rows: vec![
                RawRow::from_values(["王小明", "A1", ""]),
                RawRow::from_values(["李小華", "A1", "A1"]),
            ],
            ..Default::default()
        }
    }

    fn service_with(source: Arc<MemorySource>) -> SheetService {
        SheetService::new(source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_query_hits_source_once() {
        let source = Arc::new(MemorySource::with_sheet("3月班表", march_schedule()));
        let service = service_with(source.clone());

        let first = service.query_sheet("TP01", "3月班表", "").await.unwrap();
        // Parameters differing only in case and padding share the entry
        let second = service.query_sheet(" tp01 ", "3月班表", "").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_expires_after_two_minutes() {
        let source = Arc::new(MemorySource::with_sheet("3月班表", march_schedule()));
        let service = service_with(source.clone());

        service.query_sheet("TP01", "3月班表", "").await.unwrap();
        advance(SHEET_QUERY_TTL).await;
        service.query_sheet("TP01", "3月班表", "").await.unwrap();
        assert_eq!(source.call_count(), 2);

        // Sheet list lives longer than a query
        service.list_sheets("TP01").await.unwrap();
        advance(SHEET_QUERY_TTL).await;
        service.list_sheets("TP01").await.unwrap();
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_request() {
        let source = Arc::new(MemorySource::with_sheet("3月班表", march_schedule()));
        let service = service_with(source.clone());
        let options = NormalizeOptions::for_sheet("3月班表");

        let (a, b) = tokio::join!(
            service.load_sheet("TP01", "3月班表", "", &options),
            service.load_sheet("TP01", "3月班表", "", &options),
        );

        assert_eq!(a.unwrap().rows.len(), 2);
        assert_eq!(b.unwrap().rows.len(), 2);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_sheet_computes_row_attendance() {
        let source = Arc::new(MemorySource::with_sheet("3月班表", march_schedule()));
        let service = service_with(source);

        let sheet = service
            .load_sheet("TP01", "3月班表", "", &NormalizeOptions::for_sheet("3月班表"))
            .await
            .unwrap();
        let wang = sheet.rows[0].attendance.as_ref().unwrap();
        assert_eq!((wang.attended, wang.expected), (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_failure_is_not_cached() {
        let source = Arc::new(MemorySource::default());
        let service = service_with(source.clone());

        let err = service.query_sheet("TP01", "不存在", "").await.unwrap_err();
        assert!(matches!(err, SheetError::Application(_)));
        service.query_sheet("TP01", "不存在", "").await.unwrap_err();
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_is_never_cached() {
        let source = Arc::new(MemorySource::default());
        let service = service_with(source.clone());

        let refused = service.verify_login("王小明", "9999").await.unwrap();
        assert!(!refused.ok);
        let accepted = service.verify_login("王小明", "0101").await.unwrap();
        assert!(accepted.ok);
        service.verify_login("王小明", "0101").await.unwrap();
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_logins_with_different_codes_stay_separate() {
        let source = Arc::new(MemorySource::default());
        let service = service_with(source.clone());

        let (good, padded, same) = tokio::join!(
            service.verify_login("王小明", "0101"),
            service.verify_login("王小明", " 0101 "),
            service.verify_login("王小明", "0101"),
        );
        assert!(good.unwrap().ok);
        assert!(!padded.unwrap().ok);
        // Identical credentials still share one request
        assert!(same.unwrap().ok);
        assert_eq!(source.call_count(), 2);

        let (lower, mixed) = tokio::join!(
            service.verify_login("王小明", "abc"),
            service.verify_login("王小明", "ABC"),
        );
        assert!(!lower.unwrap().ok);
        assert!(!mixed.unwrap().ok);
        assert_eq!(source.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_are_cached_per_parameter() {
        let source = Arc::new(MemorySource::default());
        let service = service_with(source.clone());

        assert_eq!(service.resolve_warehouse_id("TP01").await.unwrap(), "id-tp01");
        assert_eq!(service.resolve_warehouse_id("tp01").await.unwrap(), "id-tp01");
        assert_eq!(service.resolve_warehouse_id("KH02").await.unwrap(), "id-kh02");
        assert_eq!(service.find_warehouse_by_name("王小明").await.unwrap(), "TP01");
        service.find_warehouse_by_name("王小明").await.unwrap();
        assert_eq!(source.call_count(), 3);
    }
}
