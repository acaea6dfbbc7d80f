use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use scorecard_backend::pipeline::run::ingest_report;
use scorecard_backend::pipeline::store::{PgSnapshotStore, SnapshotStore};
use scorecard_backend::pipeline::types::{RankedKpis, EXCLUDED_TECHNICIANS};
use scorecard_backend::pipeline::ValidPeriod;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
    store: Arc<PgSnapshotStore>,
    admin_secret: String,
    reports_dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct ApiResponse {
    message: String,
    status: String,
}

/// Read-path envelope: a missing snapshot is a success with null data and a
/// warning, never an error status, so dashboards render an empty state.
#[derive(Serialize)]
struct ScorecardResponse {
    data: Option<RankedKpis>,
    warning: Option<String>,
}

#[tokio::main]
async fn main() {
    println!("🔧 Starting Scorecard API server...");

    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in .env file");
    let admin_secret = std::env::var("ADMIN_SECRET")
        .expect("ADMIN_SECRET must be set in .env file");
    let reports_dir: PathBuf = std::env::var("REPORTS_DIR")
        .unwrap_or_else(|_| "reports".to_string())
        .into();

    // Create database connection pool
    println!("📦 Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    println!("✅ Database connected successfully");

    let state = AppState {
        store: Arc::new(PgSnapshotStore::new(pool)),
        admin_secret,
        reports_dir,
    };

    let app = Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/scorecard/:period", get(get_scorecard))
        .route("/api/admin/ingest", post(admin_ingest))
        .route("/api/admin/clear", post(admin_clear))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3001));
    println!("🚀 Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Scorecard API is running!".to_string(),
        status: "ok".to_string(),
    })
}

/// Latest ranked KPIs for one of the enumerated periods (7/30/90/365).
async fn get_scorecard(
    State(state): State<AppState>,
    Path(period): Path<i64>,
) -> Result<Json<ScorecardResponse>, (StatusCode, Json<serde_json::Value>)> {
    let Some(period) = ValidPeriod::from_days(period) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("period must be one of 7, 30, 90, 365; got {period}") })),
        ));
    };

    let latest = state.store.get_latest(period).await.map_err(|e| {
        eprintln!("Snapshot read error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "snapshot store unavailable" })),
        )
    })?;

    let response = match latest {
        Some(snapshot) => ScorecardResponse {
            data: Some(snapshot.rankings),
            warning: None,
        },
        None => ScorecardResponse {
            data: None,
            warning: Some(format!(
                "No scorecard data available yet for the {period} period"
            )),
        },
    };

    Ok(Json(response))
}

/// Force ingestion of report files sitting in the local reports directory.
/// Gated by the shared admin secret, not by user session.
async fn admin_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    check_admin_secret(&headers, &state.admin_secret)?;

    // Async fs: the directory scan and file reads must not block the runtime
    let mut entries = tokio::fs::read_dir(&state.reports_dir).await.map_err(|e| {
        eprintln!("Cannot read reports dir {:?}: {}", state.reports_dir, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut files = Vec::new();
    let mut successful = 0usize;
    let mut failed = 0usize;

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        eprintln!("Cannot read reports dir {:?}: {}", state.reports_dir, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })? {
        let path = entry.path();
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let lower = filename.to_lowercase();
        if !(lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".csv")) {
            continue;
        }

        let outcome = match tokio::fs::read(&path).await {
            Ok(bytes) => ingest_report(
                &bytes,
                &filename,
                None,
                state.store.as_ref(),
                EXCLUDED_TECHNICIANS,
            )
            .await
            .map_err(|e| e.to_string()),
            Err(e) => Err(format!("unreadable file: {e}")),
        };

        match outcome {
            // A write failure still carries the computed snapshot; the file
            // counts as failed since the store has no baseline from it
            Ok(outcome) => {
                let failed_write = outcome.store_error.is_some();
                if failed_write {
                    failed += 1;
                } else {
                    successful += 1;
                }
                files.push(json!({
                    "filename": filename,
                    "period": outcome.snapshot.period.days(),
                    "rows": outcome.snapshot.raw_rows.len(),
                    "rankings": outcome.snapshot.rankings,
                    "error": outcome.store_error,
                }));
            }
            Err(error) => {
                failed += 1;
                files.push(json!({
                    "filename": filename,
                    "period": null,
                    "rows": 0,
                    "rankings": null,
                    "error": error,
                }));
            }
        }
    }

    Ok(Json(json!({
        "files": files,
        "successful": successful,
        "failed": failed,
    })))
}

/// Destructive: drop every cached snapshot so the next refresh recomputes
/// from scratch.
async fn admin_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    check_admin_secret(&headers, &state.admin_secret)?;

    let cleared = state.store.clear_all().await.map_err(|e| {
        eprintln!("Snapshot clear error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "cleared": cleared })))
}

fn check_admin_secret(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let provided = headers
        .get("x-admin-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
