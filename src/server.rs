use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header::HeaderValue, request::Parts, HeaderMap, Request},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::AddRowUseCase;
use crate::constants::{API_SECRET_HEADER, GREETING};
use crate::error::{ApiError, Result};
use crate::observability::metrics::{self, MetricName};
use crate::rate_limiter::{retry_after_secs, ClientRateLimiter};
use crate::registry::RowRequest;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub add_row: Arc<AddRowUseCase>,
    pub api_secret: Option<Arc<str>>,
    pub limiter: Option<Arc<ClientRateLimiter>>,
    pub allowed_origins: Arc<[String]>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(add_row: AddRowUseCase) -> Self {
        Self {
            add_row: Arc::new(add_row),
            api_secret: None,
            limiter: None,
            allowed_origins: Arc::from(Vec::new()),
            metrics: None,
        }
    }

    pub fn with_api_secret(mut self, secret: Option<String>) -> Self {
        self.api_secret = secret.map(Arc::from);
        self
    }

    /// A limit of zero leaves the limiter off.
    pub fn with_rate_limit(mut self, per_minute: usize) -> Self {
        self.limiter = (per_minute > 0).then(|| Arc::new(ClientRateLimiter::per_minute(per_minute)));
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::from(origins);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": GREETING }))
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

async fn add_row(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(add_timestamp): Path<String>,
    Json(request): Json<RowRequest>,
) -> Result<Json<Vec<String>>> {
    let add_timestamp = parse_flag(&add_timestamp)?;
    submit_row(&state, addr.ip(), request, add_timestamp).await
}

#[derive(serde::Deserialize)]
struct LegacyRowPath {
    sheet_id: String,
    add_timestamp: String,
}

/// Older route shape: sheet id in the path, the body is the columns object.
async fn add_row_legacy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(params): Path<LegacyRowPath>,
    Json(columns): Json<Map<String, Value>>,
) -> Result<Json<Vec<String>>> {
    let add_timestamp = parse_flag(&params.add_timestamp)?;
    let request = RowRequest {
        sheet_id: params.sheet_id,
        columns,
    };
    submit_row(&state, addr.ip(), request, add_timestamp).await
}

/// Only rows that pass validation count against the client's rate limit.
async fn submit_row(
    state: &AppState,
    client: IpAddr,
    request: RowRequest,
    add_timestamp: bool,
) -> Result<Json<Vec<String>>> {
    let values = state.add_row.validate(&request)?;
    check_rate_limit(state, client).await?;
    let values = state
        .add_row
        .submit(&request.sheet_id, values, add_timestamp)
        .await?;
    Ok(Json(values))
}

/// Lenient boolean path parameter: true/false, 1/0, yes/no, on/off.
pub fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        _ => Err(ApiError::InvalidFlag(raw.to_string())),
    }
}

/// Rejects requests whose secret does not match the configured one. The
/// secret comes from the `api_secret` path segment when the route has one,
/// otherwise from the `X-Api-Secret` header.
async fn require_secret<B>(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response> {
    if let Some(expected) = state.api_secret.as_deref() {
        let supplied = params
            .get("api_secret")
            .map(String::as_str)
            .or_else(|| headers.get(API_SECRET_HEADER).and_then(|v| v.to_str().ok()));

        if !secrets_match(supplied, expected) {
            warn!("Rejected request with missing or wrong secret");
            metrics::increment(MetricName::Unauthorized);
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

fn secrets_match(supplied: Option<&str>, expected: &str) -> bool {
    let Some(supplied) = supplied else {
        return false;
    };
    // compare every byte so timing does not leak the matching prefix length
    supplied.len() == expected.len()
        && supplied
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

async fn check_rate_limit(state: &AppState, client: IpAddr) -> Result<()> {
    let Some(limiter) = &state.limiter else {
        return Ok(());
    };
    limiter.check(client).await.map_err(|wait| {
        warn!(%client, limit = limiter.limit(), "Rate limit exceeded");
        metrics::increment(MetricName::RateLimited);
        ApiError::RateLimited {
            retry_after_secs: retry_after_secs(wait),
        }
    })
}

/// True when `origin` is in `allowed` or points at the local machine.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    let origin = origin.trim_end_matches('/');
    if allowed.iter().any(|a| a == "*" || a == origin) {
        return true;
    }

    let host_port = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);
    let host = if host_port.starts_with('[') {
        host_port.split(']').next().map(|h| &h[1..]).unwrap_or(host_port)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Everything is allowed with no allow-list; otherwise the list plus localhost.
pub fn cors_layer(allowed_origins: Arc<[String]>) -> CorsLayer {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map_or(false, |o| origin_allowed(o, &allowed_origins))
        })
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the router. The server must provide `ConnectInfo<SocketAddr>`.
pub fn create_server(state: AppState) -> Router {
    let rows = Router::new()
        .route("/add-row/:add_timestamp", post(add_row))
        .route("/add-row/:sheet_id/:add_timestamp", post(add_row_legacy))
        .route(
            "/add-row/:api_secret/:sheet_id/:add_timestamp",
            post(add_row_legacy),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(rows)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(state.allowed_origins.clone())),
        )
        .with_state(state)
}

/// Start the HTTP server on the given address
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(state);

    info!("HTTP server running on http://{addr}");
    hyper::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for raw in ["true", "True", "1", "yes", "ON"] {
            assert!(parse_flag(raw).unwrap(), "{raw}");
        }
        for raw in ["false", "FALSE", "0", "no", "off"] {
            assert!(!parse_flag(raw).unwrap(), "{raw}");
        }
        assert!(matches!(parse_flag("maybe"), Err(ApiError::InvalidFlag(_))));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(Some("s3cret"), "s3cret"));
        assert!(!secrets_match(Some("s3creT"), "s3cret"));
        assert!(!secrets_match(Some("s3cret-longer"), "s3cret"));
        assert!(!secrets_match(None, "s3cret"));
    }

    #[test]
    fn test_origin_allowed() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(origin_allowed("https://app.example.com", &allowed));
        assert!(origin_allowed("https://app.example.com/", &allowed));
        assert!(origin_allowed("http://localhost:3000", &allowed));
        assert!(origin_allowed("http://127.0.0.1", &allowed));
        assert!(origin_allowed("http://[::1]:8080", &allowed));
        assert!(!origin_allowed("https://evil.example.com", &allowed));
        assert!(!origin_allowed("https://localhost.evil.example.com", &allowed));
    }
}
