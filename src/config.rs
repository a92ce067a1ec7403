use base64::Engine as _;
use serde::Serialize;
use std::fs;
use std::time::Duration;

use crate::constants::{
    DEFAULT_RATE_LIMIT_PER_MINUTE, DEFAULT_ROW_SIZE, DEFAULT_SHEETS_TIMEOUT_SECS,
    DEFAULT_TEST_SHEET_ID, DEFAULT_TOKEN_URI, DEPLOYMENT_SHEET_VARS,
};
use crate::error::ConfigError;
use crate::registry::SheetRegistry;

/// Runtime configuration, assembled once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Option<GoogleCredentials>,
    pub registry: SheetRegistry,
    pub test_sheet_id: String,
    pub api_secret: Option<String>,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: usize,
    pub sheets_timeout: Duration,
}

/// Google service-account fields. Serializes to the standard key-file layout.
#[derive(Clone, Serialize)]
pub struct GoogleCredentials {
    #[serde(rename = "type")]
    pub key_type: Option<String>,
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    pub client_id: Option<String>,
    pub auth_uri: Option<String>,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: Option<String>,
    pub client_x509_cert_url: Option<String>,
}

// Keep the private key out of logs.
impl std::fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = GoogleCredentials::from_lookup(&get)?;

        let test_sheet_id =
            get("TEST_SHEET_ID").unwrap_or_else(|| DEFAULT_TEST_SHEET_ID.to_string());

        let mut registry = SheetRegistry::new();
        registry.register(DEFAULT_ROW_SIZE, test_sheet_id.as_str());
        for var in DEPLOYMENT_SHEET_VARS {
            if let Some(id) = get(var) {
                registry.register(DEFAULT_ROW_SIZE, id);
            }
        }
        if let Some(list) = get("SHEET_REGISTRY") {
            registry.extend_from_list(&list)?;
        }
        if let Some(path) = get("SHEET_REGISTRY_FILE") {
            let content = fs::read_to_string(&path)
                .map_err(|source| ConfigError::RegistryFile { path: path.clone(), source })?;
            registry.extend_from_toml(&content)?;
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();

        let rate_limit_per_minute =
            parse_number(get("RATE_LIMIT_PER_MINUTE"), "RATE_LIMIT_PER_MINUTE")?
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);

        let timeout_secs = parse_number(get("SHEETS_TIMEOUT_SECS"), "SHEETS_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_SHEETS_TIMEOUT_SECS);

        Ok(Config {
            credentials,
            registry,
            test_sheet_id,
            api_secret: get("API_SECRET"),
            allowed_origins,
            rate_limit_per_minute,
            sheets_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl GoogleCredentials {
    /// Returns `None` when neither the private key nor the client email is set.
    fn from_lookup<F>(get: &F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encoded_key = get("GOOGLE_PRIVATE_KEY_BASE64");
        let client_email = get("GOOGLE_CLIENT_EMAIL");

        let (encoded_key, client_email) = match (encoded_key, client_email) {
            (None, None) => return Ok(None),
            (None, Some(_)) => return Err(ConfigError::MissingVar("GOOGLE_PRIVATE_KEY_BASE64")),
            (Some(_), None) => return Err(ConfigError::MissingVar("GOOGLE_CLIENT_EMAIL")),
            (Some(key), Some(email)) => (key, email),
        };

        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded_key.as_bytes())?;
        let private_key = String::from_utf8(decoded)?;

        Ok(Some(GoogleCredentials {
            key_type: get("GOOGLE_TYPE"),
            project_id: get("GOOGLE_PROJECT_ID"),
            private_key_id: get("GOOGLE_PRIVATE_KEY_ID"),
            private_key,
            client_email,
            client_id: get("GOOGLE_CLIENT_ID"),
            auth_uri: get("GOOGLE_AUTH_URI"),
            token_uri: get("GOOGLE_TOKEN_URI").unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            auth_provider_x509_cert_url: get("GOOGLE_AUTH_PROVIDER_X509_CERT_URL"),
            client_x509_cert_url: get("GOOGLE_CLIENT_X509_CERT_URL"),
        }))
    }
}

/// Split a comma or semicolon separated origin list.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>().map_err(|e| ConfigError::InvalidVar {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}
