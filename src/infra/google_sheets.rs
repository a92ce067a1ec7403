extern crate google_sheets4 as sheets4;

use async_trait::async_trait;
use serde_json::Value;
use sheets4::api::{Scope, ValueRange};
use sheets4::oauth2::{self, ServiceAccountKey};
use sheets4::Sheets;
use sheets4::{hyper, hyper_rustls};
use std::time::Duration;
use tracing::{debug, info};

use crate::app::ports::SpreadsheetPort;
use crate::config::GoogleCredentials;
use crate::constants::FIRST_SHEET_RANGE;
use crate::error::SheetsError;

type Connector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

/// Appends rows through the Sheets API hub authorized as a service account.
pub struct GoogleSheetsAdapter {
    hub: Sheets<Connector>,
    timeout: Duration,
}

impl GoogleSheetsAdapter {
    pub async fn connect(
        credentials: &GoogleCredentials,
        timeout: Duration,
    ) -> Result<Self, SheetsError> {
        let key: ServiceAccountKey = serde_json::to_value(credentials)
            .and_then(serde_json::from_value)
            .map_err(|e| SheetsError::Auth(format!("invalid service account key: {e}")))?;

        let auth = oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| SheetsError::Transport(e.to_string()))?
            .https_only()
            .enable_http1()
            .build();
        let client = hyper::Client::builder().build(connector);

        info!(client_email = %credentials.client_email, "Authorized Google service account");
        Ok(Self {
            hub: Sheets::new(client, auth),
            timeout,
        })
    }
}

/// One spreadsheet row in the shape `values.append` takes.
pub fn row_value_range(values: &[String]) -> ValueRange {
    ValueRange {
        major_dimension: Some("ROWS".to_string()),
        values: Some(vec![values.iter().cloned().map(Value::String).collect()]),
        ..Default::default()
    }
}

fn map_hub_error(err: sheets4::Error) -> SheetsError {
    match err {
        sheets4::Error::Failure(resp) => SheetsError::Status {
            status: resp.status().as_u16(),
            body: String::new(),
        },
        sheets4::Error::BadRequest(body) => SheetsError::Status {
            status: 400,
            body: body.to_string(),
        },
        sheets4::Error::MissingToken(e) => SheetsError::Auth(e.to_string()),
        other => SheetsError::Transport(other.to_string()),
    }
}

#[async_trait]
impl SpreadsheetPort for GoogleSheetsAdapter {
    async fn append_row(&self, sheet_id: &str, values: &[String]) -> Result<(), SheetsError> {
        debug!(%sheet_id, values = values.len(), "Sending values.append");
        let call = self
            .hub
            .spreadsheets()
            .values_append(row_value_range(values), sheet_id, FIRST_SHEET_RANGE)
            .value_input_option("RAW")
            .add_scope(Scope::Spreadsheet)
            .doit();

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(map_hub_error(e)),
            Err(_) => Err(SheetsError::Timeout(self.timeout)),
        }
    }
}

/// Backend used when no Google credentials are configured. Every append fails.
pub struct UnconfiguredSpreadsheet;

#[async_trait]
impl SpreadsheetPort for UnconfiguredSpreadsheet {
    async fn append_row(&self, _sheet_id: &str, _values: &[String]) -> Result<(), SheetsError> {
        Err(SheetsError::NotConfigured)
    }
}
