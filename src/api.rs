//! HTTP API module
//!
//! Routes for health, upstream status, host resources and the developer
//! tools. Every response body carries an ISO-8601 `timestamp`.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::executor::{
    build_executor, AppList, AppStructure, CommandExecutor, LogEntry, ScaffoldSpec,
};
use crate::system::SystemSnapshot;
use crate::upstream::NextcloudClient;

/// Current time as `2024-05-01T12:00:00.123Z`
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============ API State ============

pub struct ApiState {
    pub nextcloud: NextcloudClient,
    pub executor: Arc<dyn CommandExecutor>,
    pub log_tail_lines: usize,
}

impl ApiState {
    pub fn new(
        nextcloud: NextcloudClient,
        executor: Arc<dyn CommandExecutor>,
        log_tail_lines: usize,
    ) -> Self {
        Self {
            nextcloud,
            executor,
            log_tail_lines,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            NextcloudClient::new(&config.nextcloud)?,
            build_executor(&config.executor),
            config.executor.log_tail_lines,
        ))
    }
}

// ============ Response Types ============

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamStatusResponse {
    status: &'static str,
    nextcloud_status: serde_json::Value,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct AppListResponse {
    #[serde(flatten)]
    apps: AppList,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ResourcesResponse {
    #[serde(flatten)]
    snapshot: SystemSnapshot,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ToolInfo {
    name: &'static str,
    description: &'static str,
    endpoint: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCatalogResponse {
    available_tools: Vec<ToolInfo>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    status: &'static str,
    message: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct LogTailResponse {
    logs: Vec<LogEntry>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScaffoldResponse {
    status: &'static str,
    message: String,
    app_structure: AppStructure,
    timestamp: String,
}

// ============ Request Types ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScaffoldRequest {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ScaffoldRequest {
    /// Requests without a JSON content type, or with an empty body, read as `{}`.
    fn from_body(headers: &HeaderMap, body: &[u8]) -> ApiResult<Self> {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|mime| {
                let mime = mime.trim().to_ascii_lowercase();
                mime == "application/json" || mime.ends_with("+json")
            })
            .unwrap_or(false);

        if !is_json || body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body).map_err(|e| {
            warn!("Rejected scaffold body: {}", e);
            ApiError::BadRequest(format!("Failed to parse the request body as JSON: {}", e))
        })
    }

    fn validate(self) -> ApiResult<ScaffoldSpec> {
        match self.app_name {
            Some(name) if !name.is_empty() => Ok(ScaffoldSpec {
                name,
                author: self.author,
                description: self.description,
            }),
            _ => Err(ApiError::Validation("App name is required".to_string())),
        }
    }
}

// ============ API Endpoints ============

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: now_iso(),
    })
}

async fn nextcloud_status(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<UpstreamStatusResponse>> {
    let upstream = state.nextcloud.status().await?;

    Ok(Json(UpstreamStatusResponse {
        status: "UP",
        nextcloud_status: upstream,
        timestamp: now_iso(),
    }))
}

async fn nextcloud_apps(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<AppListResponse>> {
    let apps = state.executor.list_apps().await?;

    Ok(Json(AppListResponse {
        apps,
        timestamp: now_iso(),
    }))
}

async fn system_resources() -> Json<ResourcesResponse> {
    Json(ResourcesResponse {
        snapshot: SystemSnapshot::collect(),
        timestamp: now_iso(),
    })
}

async fn dev_tools() -> Json<ToolCatalogResponse> {
    Json(ToolCatalogResponse {
        available_tools: vec![
            ToolInfo {
                name: "cache-clear",
                description: "Clear Nextcloud cache",
                endpoint: "/api/dev/tools/cache-clear",
            },
            ToolInfo {
                name: "log-tail",
                description: "Tail Nextcloud logs",
                endpoint: "/api/dev/tools/log-tail",
            },
            ToolInfo {
                name: "app-scaffold",
                description: "Generate scaffolding for a new Nextcloud app",
                endpoint: "/api/dev/tools/app-scaffold",
            },
        ],
        timestamp: now_iso(),
    })
}

async fn cache_clear(State(state): State<Arc<ApiState>>) -> ApiResult<Json<CommandResponse>> {
    info!(executor = state.executor.name(), "Clearing Nextcloud cache");

    let outcome = state.executor.clear_cache().wait().await?;

    Ok(Json(CommandResponse {
        status: "success",
        message: outcome.message,
        timestamp: now_iso(),
    }))
}

async fn log_tail(State(state): State<Arc<ApiState>>) -> ApiResult<Json<LogTailResponse>> {
    let logs = state.executor.tail_log(state.log_tail_lines).await?;

    Ok(Json(LogTailResponse {
        logs,
        timestamp: now_iso(),
    }))
}

async fn app_scaffold(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ScaffoldResponse>> {
    let spec = ScaffoldRequest::from_body(&headers, &body)?.validate()?;
    let app_structure = state.executor.scaffold_app(&spec).await?;

    Ok(Json(ScaffoldResponse {
        status: "success",
        message: format!("App scaffold for {} created successfully", spec.name),
        app_structure,
        timestamp: now_iso(),
    }))
}

// ============ Middleware ============

async fn log_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    info!(
        method = %request.method(),
        url = %request.uri(),
        request_id = %request_id,
        "{} {}",
        request.method(),
        request.uri()
    );
    next.run(request).await
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

// ============ Router ============

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/nextcloud/status", get(nextcloud_status))
        .route("/api/nextcloud/apps", get(nextcloud_apps))
        .route("/api/system/resources", get(system_resources))
        .route("/api/dev/tools", get(dev_tools))
        .route("/api/dev/tools/cache-clear", post(cache_clear))
        .route("/api/dev/tools/log-tail", get(log_tail))
        .route("/api/dev/tools/app-scaffold", post(app_scaffold))
        .with_state(state)
        .layer(cors_layer())
        .layer(middleware::from_fn(log_request))
}

// ============ Server ============

pub async fn start_api_server(config: &AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(ApiState::from_config(config)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!("Nextcloud dev tools API running on port {}", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SimulatedExecutor;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let nextcloud = NextcloudClient::new(&crate::config::NextcloudConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            status_timeout_ms: 200,
        })
        .unwrap();
        let executor = Arc::new(SimulatedExecutor::new(Duration::from_millis(10)));
        create_router(Arc::new(ApiState::new(nextcloud, executor, 5)))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn timestamps_use_millisecond_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-05-01T12:00:00.123Z".len());
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn scaffold_validation_rejects_empty_name() {
        let request = ScaffoldRequest {
            app_name: Some(String::new()),
            ..ScaffoldRequest::default()
        };
        assert!(matches!(request.validate(), Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = test_router()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn tools_catalog_lists_three_tools() {
        let response = test_router()
            .oneshot(Request::builder().uri("/api/dev/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        let tools = body["availableTools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[2]["endpoint"], "/api/dev/tools/app-scaffold");
    }

    #[tokio::test]
    async fn scaffold_without_body_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/dev/tools/app-scaffold")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "App name is required");
    }

    #[tokio::test]
    async fn scaffold_with_malformed_json_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/dev/tools/app-scaffold")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn scaffold_with_empty_json_body_needs_app_name() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/dev/tools/app-scaffold")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "App name is required");
    }

    #[test]
    fn scaffold_body_with_charset_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());

        let request = ScaffoldRequest::from_body(&headers, br#"{"appName":"notes"}"#).unwrap();
        assert_eq!(request.app_name.as_deref(), Some("notes"));

        let ignored = ScaffoldRequest::from_body(&HeaderMap::new(), br#"{"appName":"notes"}"#);
        assert!(ignored.unwrap().app_name.is_none());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = test_router()
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
