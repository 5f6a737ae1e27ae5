//! HTTP query API and tool surface.
//!
//! Thin dispatch over the core query, stats, and refresh operations. No
//! business logic lives here beyond parameter validation and response
//! shaping; the `/tools/...` endpoints additionally apply the semantic
//! resolution layer so LLM callers can pass "TX" or "broadband".
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | API information |
//! | `GET`  | `/health` | Health check with record counts |
//! | `GET`  | `/data/summary` | Table summaries and freshness |
//! | `GET`  | `/data/columns` | Declared source columns per table |
//! | `GET`  | `/investments` | Filtered, paginated detail records |
//! | `GET`  | `/summary` | Filtered, paginated historical summary rows |
//! | `GET`  | `/aggregations/states` | State+year aggregates |
//! | `GET`  | `/aggregations/programs` | Program+year aggregates |
//! | `GET`  | `/aggregations/top` | Top-N ranking over an aggregation table |
//! | `GET`  | `/aggregations/compare` | Side-by-side state/program comparison |
//! | `POST` | `/refresh` | Run a full pipeline refresh |
//! | `GET`  | `/tools/list` | Describe the tool surface |
//! | `POST` | `/tools/get_rural_data` | Semantic query tool |
//! | `POST` | `/tools/get_data_info` | Dataset metadata tool |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be between 1 and 1000" } }
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::dataset::{DETAIL_COLUMNS, SUMMARY_COLUMNS};
use crate::db;
use crate::models::{AggregateRow, Grouping};
use crate::query::{self, RecordFilter, SummaryFilter};
use crate::refresh;
use crate::resolve;
use crate::stats;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/data/summary", get(handle_data_summary))
        .route("/data/columns", get(handle_data_columns))
        .route("/investments", get(handle_investments))
        .route("/summary", get(handle_summary))
        .route("/aggregations/states", get(handle_state_aggregations))
        .route("/aggregations/programs", get(handle_program_aggregations))
        .route("/aggregations/top", get(handle_top))
        .route("/aggregations/compare", get(handle_compare))
        .route("/refresh", post(handle_refresh))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/get_rural_data", post(handle_get_rural_data))
        .route("/tools/get_data_info", post(handle_get_data_info))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ Shared helpers ============

fn validate_page(
    state: &AppState,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<(i64, i64), AppError> {
    let limit = limit.unwrap_or(state.config.query.default_limit);
    if limit < 1 || limit > state.config.query.max_limit {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            state.config.query.max_limit
        )));
    }

    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(bad_request("offset must be >= 0"));
    }

    Ok((limit, offset))
}

fn totals(rows: &[AggregateRow]) -> Value {
    let total_dollars: f64 = rows.iter().map(|r| r.total_dollars).sum();
    let total_investments: i64 = rows.iter().map(|r| r.total_investments).sum();
    let average = if total_investments > 0 {
        total_dollars / total_investments as f64
    } else {
        0.0
    };

    json!({
        "total_investment_dollars": total_dollars,
        "total_number_of_investments": total_investments,
        "average_investment": average,
    })
}

// ============ GET / and /health ============

async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": "Rural Data Gateway API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/investments": "Query detail investment records",
            "/summary": "Query historical summary rows",
            "/aggregations/states": "State+year aggregates",
            "/aggregations/programs": "Program+year aggregates",
            "/data/summary": "Dataset statistics",
            "/health": "Health check",
        },
    }))
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let investments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM investments")
        .fetch_one(&state.pool)
        .await
        .map_err(|e| internal(e.into()))?;
    let summary: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summary")
        .fetch_one(&state.pool)
        .await
        .map_err(|e| internal(e.into()))?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected",
        "investments_records": investments,
        "summary_records": summary,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

// ============ GET /data/* ============

async fn handle_data_summary(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let summary = stats::data_summary(&state.pool).await.map_err(internal)?;
    let fresh = stats::freshness(&state.pool).await.map_err(internal)?;

    let mut body = serde_json::to_value(&summary).map_err(|e| internal(e.into()))?;
    body["data_freshness"] = serde_json::to_value(&fresh).map_err(|e| internal(e.into()))?;
    Ok(Json(body))
}

async fn handle_data_columns() -> Json<Value> {
    Json(json!({
        "investments_table": {
            "columns": DETAIL_COLUMNS,
            "total_columns": DETAIL_COLUMNS.len(),
        },
        "summary_table": {
            "columns": SUMMARY_COLUMNS,
            "total_columns": SUMMARY_COLUMNS.len(),
        },
    }))
}

// ============ GET /investments and /summary ============

#[derive(Deserialize)]
struct RecordParams {
    state: Option<String>,
    program: Option<String>,
    fiscal_year: Option<i64>,
    borrower_name: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn handle_investments(
    State(state): State<AppState>,
    Query(params): Query<RecordParams>,
) -> Result<Json<Value>, AppError> {
    let (limit, offset) = validate_page(&state, params.limit, params.offset)?;

    let mut filters = Vec::new();
    let mut applied = serde_json::Map::new();
    if let Some(v) = &params.state {
        filters.push(RecordFilter::State(v.clone()));
        applied.insert("state".to_string(), json!(v));
    }
    if let Some(v) = &params.program {
        filters.push(RecordFilter::ProgramArea(v.clone()));
        applied.insert("program".to_string(), json!(v));
    }
    if let Some(v) = params.fiscal_year {
        filters.push(RecordFilter::FiscalYear(v));
        applied.insert("fiscal_year".to_string(), json!(v));
    }
    if let Some(v) = &params.borrower_name {
        filters.push(RecordFilter::BorrowerName(v.clone()));
        applied.insert("borrower_name".to_string(), json!(v));
    }

    let page = query::query_records(&state.pool, &filters, limit, offset)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "data": page.data,
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "returned": page.returned,
        },
        "data_source": "detailed_transactions",
        "filters_applied": applied,
    })))
}

async fn handle_summary(
    State(state): State<AppState>,
    Query(params): Query<RecordParams>,
) -> Result<Json<Value>, AppError> {
    let (limit, offset) = validate_page(&state, params.limit, params.offset)?;

    let mut filters = Vec::new();
    let mut applied = serde_json::Map::new();
    if let Some(v) = &params.state {
        filters.push(SummaryFilter::State(v.clone()));
        applied.insert("state".to_string(), json!(v));
    }
    if let Some(v) = &params.program {
        filters.push(SummaryFilter::ProgramArea(v.clone()));
        applied.insert("program".to_string(), json!(v));
    }
    if let Some(v) = params.fiscal_year {
        filters.push(SummaryFilter::FiscalYear(v));
        applied.insert("fiscal_year".to_string(), json!(v));
    }

    let page = query::query_summary(&state.pool, &filters, limit, offset)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "data": page.data,
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "returned": page.returned,
        },
        "data_source": "historical_summary",
        "filters_applied": applied,
    })))
}

// ============ GET /aggregations/* ============

#[derive(Deserialize)]
struct StateAggParams {
    state: Option<String>,
    fiscal_year: Option<i64>,
}

async fn handle_state_aggregations(
    State(state): State<AppState>,
    Query(params): Query<StateAggParams>,
) -> Result<Json<Value>, AppError> {
    let rows = query::list_state_year(&state.pool, params.state.as_deref(), params.fiscal_year)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "aggregation_type": "state_summary",
        "query_params": { "state": params.state, "fiscal_year": params.fiscal_year },
        "data": rows,
        "totals": totals(&rows),
    })))
}

#[derive(Deserialize)]
struct ProgramAggParams {
    program: Option<String>,
    fiscal_year: Option<i64>,
}

async fn handle_program_aggregations(
    State(state): State<AppState>,
    Query(params): Query<ProgramAggParams>,
) -> Result<Json<Value>, AppError> {
    let rows = query::list_program_year(&state.pool, params.program.as_deref(), params.fiscal_year)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "aggregation_type": "program_summary",
        "query_params": { "program": params.program, "fiscal_year": params.fiscal_year },
        "data": rows,
        "totals": totals(&rows),
    })))
}

#[derive(Deserialize)]
struct TopParams {
    grouping: Option<String>,
    n: Option<i64>,
}

async fn handle_top(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Result<Json<Value>, AppError> {
    let grouping_str = params.grouping.as_deref().unwrap_or("states");
    let grouping = Grouping::parse(grouping_str).ok_or_else(|| {
        bad_request(format!(
            "unknown grouping: '{}'. Use states, programs, or state_programs.",
            grouping_str
        ))
    })?;

    let n = params.n.unwrap_or(10);
    if !(1..=100).contains(&n) {
        return Err(bad_request("n must be between 1 and 100"));
    }

    let rows = query::top_n(&state.pool, grouping, n)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "aggregation_type": "top_n",
        "grouping": grouping.table(),
        "n": n,
        "data": rows,
    })))
}

#[derive(Deserialize)]
struct CompareParams {
    compare_type: String,
    items: String,
    fiscal_year: Option<i64>,
}

async fn handle_compare(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> Result<Json<Value>, AppError> {
    let items: Vec<&str> = params
        .items
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return Err(bad_request("items must be a non-empty comma-separated list"));
    }

    let mut comparisons = Vec::new();
    for &item in &items {
        let rows = match params.compare_type.as_str() {
            "states" => query::list_state_year(&state.pool, Some(item), params.fiscal_year)
                .await
                .map_err(internal)?,
            "programs" => query::list_program_year(&state.pool, Some(item), params.fiscal_year)
                .await
                .map_err(internal)?,
            other => {
                return Err(bad_request(format!(
                    "compare_type must be 'states' or 'programs', got '{}'",
                    other
                )))
            }
        };
        comparisons.push(json!({
            "item": item,
            "data": rows,
            "totals": totals(&rows),
        }));
    }

    Ok(Json(json!({
        "comparison_type": params.compare_type,
        "items_requested": items,
        "fiscal_year": params.fiscal_year,
        "comparisons": comparisons,
        "count": comparisons.len(),
    })))
}

// ============ POST /refresh ============

async fn handle_refresh(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let report = refresh::run_refresh(&state.config, &state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(
        serde_json::to_value(&report).map_err(|e| internal(e.into()))?,
    ))
}

// ============ Tool surface ============

async fn handle_list_tools() -> Json<Value> {
    Json(json!({
        "tools": [
            {
                "name": "get_rural_data",
                "description": "Query USDA rural investment data by location, program, and fiscal year. Accepts state abbreviations and program synonyms.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "location": { "type": "string", "description": "State name or abbreviation (e.g. 'Texas', 'TX')" },
                        "program": { "type": "string", "description": "Program area or synonym (e.g. 'broadband', 'housing')" },
                        "fiscal_year": { "type": "integer", "description": "Fiscal year (e.g. 2023)" },
                        "response_type": { "type": "string", "enum": ["summary", "details"], "description": "Aggregated summary or individual records" },
                        "limit": { "type": "integer", "description": "Maximum records for details responses (max 100)" },
                    },
                },
            },
            {
                "name": "get_data_info",
                "description": "Get dataset metadata: record counts, coverage, available filters, and data freshness.",
                "parameters": { "type": "object", "properties": {} },
            },
        ],
    }))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RuralDataParams {
    location: Option<String>,
    program: Option<String>,
    fiscal_year: Option<i64>,
    response_type: Option<String>,
    limit: Option<i64>,
}

const TOOL_DEFAULT_LIMIT: i64 = 10;
const TOOL_MAX_LIMIT: i64 = 100;

async fn handle_get_rural_data(
    State(state): State<AppState>,
    Json(params): Json<RuralDataParams>,
) -> Result<Json<Value>, AppError> {
    let response_type = params.response_type.as_deref().unwrap_or("summary");
    if response_type != "summary" && response_type != "details" {
        return Err(bad_request(
            "response_type must be 'summary' or 'details'",
        ));
    }

    let resolved_location = params.location.as_deref().map(resolve::resolve_state);
    let resolved_program = params.program.as_deref().map(resolve::resolve_program);

    let fresh = stats::freshness(&state.pool).await.map_err(internal)?;

    let query_context = json!({
        "location_requested": &params.location,
        "location_resolved": &resolved_location,
        "program_requested": &params.program,
        "program_resolved": &resolved_program,
        "fiscal_year": params.fiscal_year,
        "response_type": response_type,
    });

    // Summary requests for a location are served from the precomputed
    // aggregation tables; everything else reads detail records.
    if response_type == "summary" {
        if let Some(location) = &resolved_location {
            let rows = match &resolved_program {
                Some(program) => query::list_state_program_year(
                    &state.pool,
                    Some(location),
                    Some(program),
                    params.fiscal_year,
                )
                .await
                .map_err(internal)?,
                None => query::list_state_year(&state.pool, Some(location), params.fiscal_year)
                    .await
                    .map_err(internal)?,
            };

            return Ok(Json(json!({
                "query_context": query_context,
                "data": rows,
                "response_context": {
                    "data_source_used": "aggregated",
                    "aggregations": totals(&rows),
                },
                "data_freshness": fresh,
            })));
        }
    }

    let limit = params
        .limit
        .unwrap_or(TOOL_DEFAULT_LIMIT)
        .clamp(1, TOOL_MAX_LIMIT);

    let mut filters = Vec::new();
    if let Some(location) = &resolved_location {
        filters.push(RecordFilter::State(location.clone()));
    }
    if let Some(program) = &resolved_program {
        filters.push(RecordFilter::ProgramArea(program.clone()));
    }
    if let Some(year) = params.fiscal_year {
        filters.push(RecordFilter::FiscalYear(year));
    }

    let page = query::query_records(&state.pool, &filters, limit, 0)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "query_context": query_context,
        "data": page.data,
        "response_context": {
            "data_source_used": "detailed_transactions",
            "total_matching_records": page.total,
            "records_returned": page.returned,
            "showing": format!("{} of {} matching investments", page.returned, page.total),
        },
        "data_freshness": fresh,
    })))
}

async fn handle_get_data_info(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let summary = stats::data_summary(&state.pool).await.map_err(internal)?;
    let fresh = stats::freshness(&state.pool).await.map_err(internal)?;

    let states: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT state_name FROM investments WHERE state_name != '' ORDER BY state_name",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(|e| internal(e.into()))?;

    let program_areas: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT program_area FROM investments \
         WHERE program_area IS NOT NULL ORDER BY program_area",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(|e| internal(e.into()))?;

    Ok(Json(json!({
        "dataset_overview": {
            "name": "USDA Rural Development Investment Data",
            "dual_datasets": {
                "detailed_transactions": {
                    "records": summary.investments_table.record_count,
                    "fiscal_year_range": [
                        summary.investments_table.fiscal_year_min,
                        summary.investments_table.fiscal_year_max,
                    ],
                    "description": "Individual transaction-level data",
                },
                "historical_summary": {
                    "records": summary.summary_table.record_count,
                    "fiscal_year_range": [
                        summary.summary_table.fiscal_year_min,
                        summary.summary_table.fiscal_year_max,
                    ],
                    "description": "State+program aggregated data",
                },
            },
            "last_updated": summary.last_updated,
        },
        "available_filters": {
            "states": states,
            "program_areas": program_areas,
        },
        "data_freshness": fresh,
    })))
}
