use async_trait::async_trait;

use crate::error::SheetsError;

/// Append-only access to a remote spreadsheet.
#[async_trait]
pub trait SpreadsheetPort: Send + Sync {
    /// Append one row of values to the first sheet of `sheet_id`.
    async fn append_row(&self, sheet_id: &str, values: &[String]) -> Result<(), SheetsError>;
}
