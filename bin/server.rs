// Sales Ledger - Web Server
// REST API with Axum over the same core the CLI uses.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use sales_ledger::{
    load_settings_with_fallback, read_grid, summarize_months, summarize_range, ColumnSelection,
    DedupIngestor, FileKind, IngestMode, LedgerError, ReconciliationEngine, SalesQueries,
    Settings, SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Shared application state. The mutex also serializes ingestion runs.
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    settings: Arc<Settings>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    log::warn!("{} {}", status, message);
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

/// Input problems are the caller's; backend failures are surfaced verbatim as 500.
fn ledger_error(e: LedgerError) -> Response {
    let status = match &e {
        LedgerError::HeaderNotFound { .. }
        | LedgerError::NoIdentifierColumn
        | LedgerError::UnknownColumn(_)
        | LedgerError::Spreadsheet(_)
        | LedgerError::Csv(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::UnsupportedFile(_) | LedgerError::Config(_) => StatusCode::BAD_REQUEST,
        LedgerError::Io(_) | LedgerError::Database(_) | LedgerError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

fn lock_store(state: &AppState) -> std::result::Result<MutexGuard<'_, SqliteStore>, Response> {
    state.store.lock().map_err(|_| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store lock poisoned".to_string(),
        )
    })
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
struct SalesParams {
    /// Comma-separated YYYY-MM list; empty means the latest month
    #[serde(default)]
    months: String,
}

#[derive(Deserialize)]
struct RangeParams {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct IngestParams {
    #[serde(default)]
    mode: IngestMode,
    filename: String,
}

/// Both ledgers as delimited text
#[derive(Deserialize)]
struct ReconcileRequest {
    system: String,
    external: String,
    #[serde(default)]
    selection: ColumnSelection,
    tolerance: Option<f64>,
}

#[derive(Serialize)]
struct BoundsResponse {
    first_order: String,
    last_order: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/months - Months with orders, newest first
async fn get_months(State(state): State<AppState>) -> Response {
    let store = match lock_store(&state) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match store.available_months() {
        Ok(months) => ApiResponse::ok(months),
        Err(e) => ledger_error(e),
    }
}

/// GET /api/sales?months=2024-01,2024-02 - Summary for selected months
async fn get_sales(State(state): State<AppState>, Query(params): Query<SalesParams>) -> Response {
    let months: Vec<String> = params
        .months
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    let store = match lock_store(&state) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match summarize_months(&*store, &months) {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => ledger_error(e),
    }
}

/// GET /api/sales/range?start=2024-01-01&end=2024-01-31 - Summary for a date range
async fn get_sales_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Response {
    if params.start > params.end {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("start {} is after end {}", params.start, params.end),
        );
    }

    let store = match lock_store(&state) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match summarize_range(&*store, params.start, params.end) {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => ledger_error(e),
    }
}

/// GET /api/sales/bounds - Oldest and newest order timestamps
async fn get_sales_bounds(State(state): State<AppState>) -> Response {
    let store = match lock_store(&state) {
        Ok(s) => s,
        Err(r) => return r,
    };
    match store.date_bounds() {
        Ok(Some((first, last))) => ApiResponse::ok(BoundsResponse {
            first_order: first.to_string(),
            last_order: last.to_string(),
        }),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no orders persisted".to_string()),
        Err(e) => ledger_error(e),
    }
}

/// POST /api/ingest?mode=append&filename=pedidos.xlsx - Raw file in the body
async fn ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Response {
    let kind = match FileKind::from_filename_with_delimiter(
        &params.filename,
        state.settings.parsing.csv_delimiter,
    ) {
        Ok(k) => k,
        Err(e) => return ledger_error(e),
    };

    let ingestor = DedupIngestor::from_settings(&state.settings);
    let mut store = match lock_store(&state) {
        Ok(s) => s,
        Err(r) => return r,
    };

    match ingestor.ingest_bytes(&mut *store, &body, kind, params.mode) {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => ledger_error(e),
    }
}

/// POST /api/reconcile - Day-by-day comparison of two delimited ledgers
async fn reconcile(
    State(state): State<AppState>,
    Json(request): Json<ReconcileRequest>,
) -> Response {
    let delimiter = state.settings.parsing.csv_delimiter;
    let kind = match FileKind::from_filename_with_delimiter("upload.csv", delimiter) {
        Ok(k) => k,
        Err(e) => return ledger_error(e),
    };

    let grids = read_grid(request.system.as_bytes(), kind)
        .and_then(|s| read_grid(request.external.as_bytes(), kind).map(|e| (s, e)));
    let (system, external) = match grids {
        Ok(g) => g,
        Err(e) => return ledger_error(e),
    };

    let mut engine = ReconciliationEngine::from_settings(&state.settings);
    if let Some(t) = request.tolerance {
        if !(t >= 0.0) {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("tolerance must be a non-negative number, got {}", t),
            );
        }
        engine.tolerance = t;
    }

    match engine.reconcile(&system, &external, &request.selection) {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => ledger_error(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("🌐 Sales Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var_os("SALES_LEDGER_CONFIG").map(PathBuf::from);
    let settings = load_settings_with_fallback(config_path.as_deref())
        .context("Failed to load settings")?;

    let store = SqliteStore::open(&settings.database).with_context(|| {
        format!(
            "Failed to open database {}",
            settings.database.path.display()
        )
    })?;
    println!("✓ Database opened: {}", settings.database.path.display());

    // Create shared state
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        settings: Arc::new(settings),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/months", get(get_months))
        .route("/sales", get(get_sales))
        .route("/sales/range", get(get_sales_range))
        .route("/sales/bounds", get(get_sales_bounds))
        .route("/ingest", post(ingest))
        .route("/reconcile", post(reconcile))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("SALES_LEDGER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/months", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped with an error")?;

    Ok(())
}
