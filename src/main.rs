// Main entry point for the manga colorization service

use manga_colorize::{
    core::{types::*, Config},
    orchestration::BatchController,
    services::{codec, GeminiClient, GenerationClient},
    utils::{export, Metrics},
};

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    client: Arc<dyn GenerationClient>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().expect("Failed to load configuration"));

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_colorize={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANGA COLORIZATION SERVICE ===");
    info!(
        "Config: model={} retries={} timeout={}s",
        config.image_model(),
        config.max_retries(),
        config.request_timeout().as_secs()
    );

    // Initialize metrics
    let metrics = Metrics::new();

    // Initialize generation client
    let client: Arc<dyn GenerationClient> =
        Arc::new(GeminiClient::new(config.clone(), Some(metrics.clone()))?);
    let state = AppState {
        config: config.clone(),
        client,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router with monitoring endpoints
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/colorize", post(colorize_images))
        .with_state(state)
        .layer(DefaultBodyLimit::max(200 * 1024 * 1024)) // 200MB for large batches
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /          - Root endpoint");
    info!("  GET  /health    - Health check");
    info!("  GET  /metrics   - Prometheus metrics");
    info!("  GET  /stats     - Detailed statistics");
    info!("  POST /colorize  - Colorize images (multipart/form-data)");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Manga Colorization Service"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.image_model(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/metrics");
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/stats");
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Colorize images endpoint
///
/// # Request Format:
/// - multipart/form-data
/// - Field "images": One or more image files (PNG/JPEG/WEBP)
/// - Field "config" (optional): JSON with style / title / custom_instructions
///
/// # Response:
/// - BatchResponse JSON with one result per page, colorized pages inlined as
///   data URLs
async fn colorize_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, (StatusCode, String)> {
    let start_time = std::time::Instant::now();

    info!("Received colorize request");
    state.metrics.record_endpoint_request("/colorize");

    let mut files = Vec::new();
    let mut config = ColorizationConfig::default();

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "images" => {
                let filename = field.file_name().unwrap_or("unknown.png").to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;

                files.push((filename, data.to_vec(), media_type));
            }
            "config" => {
                let config_data = field.text().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, format!("Config read error: {}", e))
                })?;

                config = serde_json::from_str(&config_data).map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Invalid config JSON: {}", e),
                    )
                })?;
            }
            _ => {}
        }
    }

    // Non-image fields are dropped, not fatal; only an all-junk upload is.
    let sources = codec::encode_batch(files);
    if sources.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images provided".to_string()));
    }

    info!("Colorizing {} images", sources.len());

    // One controller per request; sessions do not outlive the response.
    let controller = BatchController::new(state.client.clone(), Some(state.metrics.clone()));
    controller.load_files(sources).await;
    controller.set_config(config);

    let outcome = controller.run_sweep().await.map_err(|e| {
        error!("Batch colorization failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Colorization failed: {}", e),
        )
    })?;

    // Server-side export runs detached so the stagger never delays the response.
    if let Some(dir) = state.config.export_dir() {
        let jobs = controller.jobs();
        let dir = dir.to_path_buf();
        let stagger = state.config.download_stagger();
        tokio::spawn(async move {
            if let Err(e) = export::export_all(&jobs, &dir, stagger).await {
                warn!("export failed: {e:#}");
            }
        });
    }

    let results: Vec<JobResult> = controller
        .jobs()
        .iter()
        .map(|job| {
            JobResult {
                id: job.id.clone(),
                filename: job.source.filename.clone(),
                status: job.status,
                error: job.last_error.clone(),
                data_url: job.result.as_ref().map(|payload| {
                    format!(
                        "data:{};base64,{}",
                        payload.media_type,
                        BASE64.encode(payload.bytes.as_slice())
                    )
                }),
            }
        })
        .collect();

    let progress = outcome.progress;
    info!(
        "Request completed in {:.2}s: {} successful, {} failed",
        start_time.elapsed().as_secs_f64(),
        progress.successful,
        progress.failed
    );

    Ok(Json(BatchResponse {
        total: progress.total,
        successful: progress.successful,
        failed: progress.failed,
        completed: outcome.completed,
        processing_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
        results,
    }))
}
