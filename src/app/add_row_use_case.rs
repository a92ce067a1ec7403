use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::ports::SpreadsheetPort;
use crate::error::AddRowError;
use crate::observability::metrics::{self, MetricName};
use crate::registry::{RowRequest, SheetRegistry};

/// Validates row submissions and forwards them to the spreadsheet backend.
pub struct AddRowUseCase {
    registry: SheetRegistry,
    test_sheet_id: String,
    spreadsheet: Arc<dyn SpreadsheetPort>,
}

impl AddRowUseCase {
    pub fn new(
        registry: SheetRegistry,
        test_sheet_id: impl Into<String>,
        spreadsheet: Arc<dyn SpreadsheetPort>,
    ) -> Self {
        Self {
            registry,
            test_sheet_id: test_sheet_id.into(),
            spreadsheet,
        }
    }

    pub fn registry(&self) -> &SheetRegistry {
        &self.registry
    }

    /// Validate `request` and append it, returning the values that were sent.
    pub async fn execute(
        &self,
        request: &RowRequest,
        add_timestamp: bool,
    ) -> Result<Vec<String>, AddRowError> {
        let values = self.validate(request)?;
        self.submit(&request.sheet_id, values, add_timestamp).await
    }

    /// Check `request` against the registry and return its values in column order.
    pub fn validate(&self, request: &RowRequest) -> Result<Vec<String>, AddRowError> {
        self.registry.validate(request).map_err(|e| {
            debug!(sheet_id = %request.sheet_id, error = %e, "Row rejected");
            metrics::increment(MetricName::RowsRejected);
            e.into()
        })
    }

    /// Append already validated `values` to `sheet_id`.
    ///
    /// Rows for the test sheet are echoed back without a timestamp and
    /// without contacting the backend.
    pub async fn submit(
        &self,
        sheet_id: &str,
        mut values: Vec<String>,
        add_timestamp: bool,
    ) -> Result<Vec<String>, AddRowError> {
        if sheet_id == self.test_sheet_id {
            metrics::increment(MetricName::RowsDryRun);
            return Ok(values);
        }

        if add_timestamp {
            values.push(format_timestamp(Utc::now()));
        }

        if let Err(e) = self.spreadsheet.append_row(sheet_id, &values).await {
            warn!(%sheet_id, error = %e, "Append failed");
            metrics::increment(MetricName::UpstreamFailures);
            return Err(e.into());
        }

        info!(%sheet_id, values = values.len(), "Row appended");
        metrics::increment(MetricName::RowsAppended);
        Ok(values)
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetsError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    struct MockSpreadsheet {
        pub rows: Arc<tokio::sync::Mutex<Vec<(String, Vec<String>)>>>,
        fail: bool,
    }

    impl MockSpreadsheet {
        fn new(fail: bool) -> Self {
            Self {
                rows: Arc::new(tokio::sync::Mutex::new(Vec::new())),
                fail,
            }
        }
    }

    #[async_trait]
    impl SpreadsheetPort for MockSpreadsheet {
        async fn append_row(&self, sheet_id: &str, values: &[String]) -> Result<(), SheetsError> {
            if self.fail {
                return Err(SheetsError::Status {
                    status: 404,
                    body: "Requested entity was not found.".to_string(),
                });
            }
            self.rows
                .lock()
                .await
                .push((sheet_id.to_string(), values.to_vec()));
            Ok(())
        }
    }

    fn use_case(spreadsheet: Arc<MockSpreadsheet>) -> AddRowUseCase {
        let mut registry = SheetRegistry::new();
        registry.register(3, "dry");
        registry.register(3, "live");
        AddRowUseCase::new(registry, "dry", spreadsheet)
    }

    fn request(sheet_id: &str) -> RowRequest {
        serde_json::from_value(json!({
            "sheet_id": sheet_id,
            "columns": { "Name": "aaaa", "Email": "aaa@gmail.com", "Phone": "99999999" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_sheet_skips_backend_and_timestamp() {
        let mock = Arc::new(MockSpreadsheet::new(false));
        let values = use_case(mock.clone())
            .execute(&request("dry"), true)
            .await
            .unwrap();
        assert_eq!(values, vec!["aaaa", "aaa@gmail.com", "99999999"]);
        assert!(mock.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_is_appended_and_sent() {
        let mock = Arc::new(MockSpreadsheet::new(false));
        let values = use_case(mock.clone())
            .execute(&request("live"), true)
            .await
            .unwrap();
        assert_eq!(values.len(), 4);
        let stamp = DateTime::parse_from_rfc3339(&values[3]).unwrap();
        assert_eq!(stamp.offset().local_minus_utc(), 0);

        let rows = mock.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], ("live".to_string(), values.clone()));
    }

    #[tokio::test]
    async fn test_without_timestamp_sends_values_only() {
        let mock = Arc::new(MockSpreadsheet::new(false));
        let values = use_case(mock.clone())
            .execute(&request("live"), false)
            .await
            .unwrap();
        assert_eq!(values, vec!["aaaa", "aaa@gmail.com", "99999999"]);
        assert_eq!(mock.rows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_row_never_reaches_backend() {
        let mock = Arc::new(MockSpreadsheet::new(false));
        let err = use_case(mock.clone())
            .execute(&request("unknown"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AddRowError::Validation(_)));
        assert!(mock.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let mock = Arc::new(MockSpreadsheet::new(true));
        let err = use_case(mock).execute(&request("live"), false).await.unwrap_err();
        assert!(matches!(err, AddRowError::Upstream(SheetsError::Status { status: 404, .. })));
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T12:30:00.000000+00:00");
    }
}
