/// Shared constants for the relay: validation limits, defaults and Google endpoints.

/// Longest column value (in characters) accepted for a row.
pub const MAX_VALUE_CHARS: usize = 80;

/// Column count the dry-run sheet and the per-deployment sheets are registered under.
pub const DEFAULT_ROW_SIZE: usize = 3;

/// Sheet identifier used when `TEST_SHEET_ID` is not set.
pub const DEFAULT_TEST_SHEET_ID: &str = "test-sheet";

// Per-deployment sheet variables, all registered under `DEFAULT_ROW_SIZE`
pub const DEPLOYMENT_SHEET_VARS: [&str; 3] = ["CORA_SHEET_ID", "STELLA_SHEET_ID", "GAMALABS_SHEET_ID"];

pub const DEFAULT_RATE_LIMIT_PER_MINUTE: usize = 3;
pub const DEFAULT_SHEETS_TIMEOUT_SECS: u64 = 30;

// Google endpoints
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Range that resolves to the first visible sheet of a spreadsheet.
pub const FIRST_SHEET_RANGE: &str = "A1";

/// Header carrying the shared secret on the JSON routes.
pub const API_SECRET_HEADER: &str = "x-api-secret";

pub const GREETING: &str = "Hello, broski!";
