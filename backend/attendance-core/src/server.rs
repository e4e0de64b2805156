// src/server.rs
//
// Dashboard HTTP API over the cached sheet service.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aggregate::{
    aggregate_by_employee, day_statistics, range_statistics, rank, EmployeeAttendance, Ranking,
    DEFAULT_RANKING_SIZE,
};
use crate::classifier::ExclusionSets;
use crate::config::Config;
use crate::dates::current_year;
use crate::error::SheetError;
use crate::export::{attendance_table, sheet_table, to_csv, to_excel_html};
use crate::leave_tags::{extract_tag_dates, locate_record_columns, TagDates, TagMode, TagSource};
use crate::normalize::{NormalizeOptions, NormalizedSheet};
use crate::session_store::{
    AttendanceSnapshot, LoginHistoryEntry, RememberedLogin, SessionId, SessionStore,
};
use crate::sheet_service::SheetService;

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Sheet(sheet_err) => match sheet_err {
                SheetError::NotConfigured | SheetError::Storage { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                SheetError::Http { .. } | SheetError::Network { .. } | SheetError::Decode { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                SheetError::Application(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, AppError>;

// --- State ---

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SheetService>,
    pub sessions: Arc<SessionStore>,
    pub configured: bool,
}

impl AppState {
    pub fn new(service: SheetService, sessions: SessionStore, config: &Config) -> Self {
        Self {
            service: Arc::new(service),
            sessions: Arc::new(sessions),
            configured: config.sheet_api_url.as_deref().is_some_and(|u| !u.trim().is_empty()),
        }
    }
}

// --- Query Parameters ---

#[derive(Debug, Deserialize)]
pub struct WarehouseParams {
    pub warehouse: String,
}

#[derive(Debug, Deserialize)]
pub struct SheetParams {
    pub warehouse: String,
    pub sheet: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Per-row attendance for schedule sheets, on unless `false`
    #[serde(default)]
    pub attendance: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RankingParams {
    pub warehouse: String,
    pub sheet: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub warehouse: String,
    pub sheet: String,
    pub end: String,
    #[serde(default)]
    pub employee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayParams {
    pub warehouse: String,
    pub sheet: String,
    pub date: String,
    #[serde(default)]
    pub employee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaveTagParams {
    pub warehouse: String,
    pub sheet: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: Option<TagMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportView {
    /// Raw sheet cells
    Sheet,
    /// Name, rate and status per row
    Attendance,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub warehouse: String,
    pub sheet: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attendance: Option<bool>,
    #[serde(default)]
    pub view: Option<ExportView>,
}

#[derive(Debug, Deserialize)]
pub struct NameParams {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub remember: bool,
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct EmployeeList {
    warehouse: String,
    sheet: String,
    items: Vec<EmployeeAttendance>,
}

#[derive(Debug, Serialize)]
pub struct LeaveTagResponse {
    mode: TagMode,
    tags: Vec<TagDates>,
}

// --- Helpers ---

/// Client session header; issued by the server on the first write.
pub const SESSION_HEADER: &str = "x-session-id";

fn require(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

async fn load_sheet(
    state: &AppState,
    warehouse: &str,
    sheet: &str,
    name: Option<&str>,
    attendance: bool,
) -> ApiResult<NormalizedSheet> {
    require(warehouse, "warehouse")?;
    require(sheet, "sheet")?;
    let mut options = NormalizeOptions::for_sheet(sheet);
    if !attendance {
        options = options.without_attendance();
    }
    let loaded = state
        .service
        .load_sheet(warehouse, sheet, name.unwrap_or(""), &options)
        .await?;
    Ok(loaded)
}

fn employees_of(sheet: &NormalizedSheet) -> Vec<EmployeeAttendance> {
    aggregate_by_employee(&sheet.rows, &sheet.date_columns, &ExclusionSets::default())
}

/// Session named by the request, if any. A malformed id is rejected rather
/// than silently replaced.
fn request_session(headers: &HeaderMap) -> ApiResult<Option<SessionId>> {
    match headers.get(SESSION_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(SessionId::parse)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("invalid '{}' header", SESSION_HEADER))),
    }
}

fn session_or_new(headers: &HeaderMap) -> ApiResult<SessionId> {
    Ok(request_session(headers)?.unwrap_or_else(SessionId::generate))
}

fn with_session<T: IntoResponse>(session: &SessionId, body: T) -> Response {
    ([(SESSION_HEADER, session.to_string())], body).into_response()
}

fn attachment(file_name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(file_name.as_bytes()).collect();
    format!("attachment; filename*=UTF-8''{}", encoded.replace('+', "%20"))
}

// --- Handlers ---

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "sheetApiConfigured": state.configured }))
}

async fn list_sheets(
    State(state): State<AppState>,
    Query(params): Query<WarehouseParams>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&params.warehouse, "warehouse")?;
    let sheets = state.service.list_sheets(&params.warehouse).await?;
    Ok(Json(json!({ "sheets": sheets })))
}

async fn get_sheet(
    State(state): State<AppState>,
    Query(params): Query<SheetParams>,
) -> ApiResult<Json<NormalizedSheet>> {
    let sheet = load_sheet(
        &state,
        &params.warehouse,
        &params.sheet,
        params.name.as_deref(),
        params.attendance.unwrap_or(true),
    )
    .await?;
    Ok(Json(sheet))
}

async fn attendance_ranking(
    State(state): State<AppState>,
    Query(params): Query<RankingParams>,
) -> ApiResult<Json<Ranking>> {
    let sheet = load_sheet(&state, &params.warehouse, &params.sheet, params.name.as_deref(), true).await?;
    let employees = employees_of(&sheet);
    let size = params.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_RANKING_SIZE);
    Ok(Json(rank(&employees, size)))
}

/// Full per-employee list; also saved as the snapshot of the caller's session.
async fn attendance_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RankingParams>,
) -> ApiResult<Response> {
    let session = session_or_new(&headers)?;
    let sheet = load_sheet(&state, &params.warehouse, &params.sheet, params.name.as_deref(), true).await?;
    let items = employees_of(&sheet);

    let snapshot = AttendanceSnapshot::from_employees(&params.warehouse, &params.sheet, &items);
    if let Err(e) = state.sessions.for_session(&session).save_snapshot(&snapshot).await {
        // The list is still useful without the snapshot
        warn!("Could not save attendance snapshot: {}", e);
    }

    let list = EmployeeList {
        warehouse: params.warehouse,
        sheet: params.sheet,
        items,
    };
    Ok(with_session(&session, Json(list)))
}

async fn attendance_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AttendanceSnapshot>> {
    let missing = || AppError::NotFound("no attendance snapshot saved".to_string());
    let session = request_session(&headers)?.ok_or_else(missing)?;
    state
        .sessions
        .for_session(&session)
        .load_snapshot()
        .await?
        .map(Json)
        .ok_or_else(missing)
}

async fn attendance_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<Vec<EmployeeAttendance>>> {
    require(&params.end, "end")?;
    let sheet = load_sheet(&state, &params.warehouse, &params.sheet, None, true).await?;
    range_statistics(
        &sheet.rows,
        &sheet.date_columns,
        &ExclusionSets::default(),
        &params.end,
        params.employee.as_deref(),
    )
    .map(Json)
    .ok_or_else(|| AppError::NotFound(format!("no date column matches '{}'", params.end)))
}

async fn attendance_day(
    State(state): State<AppState>,
    Query(params): Query<DayParams>,
) -> ApiResult<Json<Vec<EmployeeAttendance>>> {
    require(&params.date, "date")?;
    let sheet = load_sheet(&state, &params.warehouse, &params.sheet, None, true).await?;
    day_statistics(
        &sheet.rows,
        &sheet.date_columns,
        &ExclusionSets::default(),
        &params.date,
        params.employee.as_deref(),
    )
    .map(Json)
    .ok_or_else(|| AppError::NotFound(format!("no date column matches '{}'", params.date)))
}

async fn leave_tags(
    State(state): State<AppState>,
    Query(params): Query<LeaveTagParams>,
) -> ApiResult<Json<LeaveTagResponse>> {
    let sheet = load_sheet(&state, &params.warehouse, &params.sheet, params.name.as_deref(), false).await?;
    let mode = params.mode.unwrap_or(TagMode::Matrix);
    let source = match mode {
        TagMode::Matrix => TagSource::Matrix(&sheet.date_columns),
        TagMode::Record => {
            let (date_column, leave_column) = locate_record_columns(&sheet.headers).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "sheet '{}' has no date and leave-type columns",
                    params.sheet
                ))
            })?;
            TagSource::Record {
                date_column,
                leave_column,
            }
        }
    };
    let tags = extract_tag_dates(&sheet.rows, source, current_year());
    Ok(Json(LeaveTagResponse { mode, tags }))
}

async fn export_table(state: &AppState, params: &ExportParams) -> ApiResult<(Vec<String>, Vec<Vec<String>>)> {
    let view = params.view.unwrap_or(ExportView::Sheet);
    let sheet = load_sheet(
        state,
        &params.warehouse,
        &params.sheet,
        params.name.as_deref(),
        params.attendance.unwrap_or(true) || view == ExportView::Attendance,
    )
    .await?;
    Ok(match view {
        ExportView::Sheet => sheet_table(&sheet),
        ExportView::Attendance => attendance_table(&sheet),
    })
}

async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let (headers, rows) = export_table(&state, &params).await?;
    let body = to_csv(&headers, &rows);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&format!("{}.csv", params.sheet))),
        ],
        body,
    )
        .into_response())
}

async fn export_html(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let (headers, rows) = export_table(&state, &params).await?;
    let body = to_excel_html(&headers, &rows, &params.sheet);
    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.ms-excel; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&format!("{}.xls", params.sheet))),
        ],
        body,
    )
        .into_response())
}

async fn warehouse_id(
    State(state): State<AppState>,
    Query(params): Query<WarehouseParams>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&params.warehouse, "warehouse")?;
    let id = state.service.resolve_warehouse_id(&params.warehouse).await?;
    Ok(Json(json!({ "id": id })))
}

async fn warehouse_by_name(
    State(state): State<AppState>,
    Query(params): Query<NameParams>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&params.name, "name")?;
    let warehouse = state.service.find_warehouse_by_name(&params.name).await?;
    Ok(Json(json!({ "warehouse": warehouse })))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    require(&request.name, "name")?;
    let session = request_session(&headers)?;
    let result = state.service.verify_login(&request.name, &request.code).await?;
    if !result.ok {
        info!("Login refused for '{}'", request.name);
        return Ok(Json(result).into_response());
    }

    let session = session.unwrap_or_else(SessionId::generate);
    let store = state.sessions.for_session(&session);
    let name = result.name.clone().unwrap_or_else(|| request.name.trim().to_string());
    let warehouse_key = result.warehouse_key.clone().unwrap_or_default();
    let now = Utc::now();
    store
        .record_login(LoginHistoryEntry {
            name: name.clone(),
            warehouse_key: warehouse_key.clone(),
            at: now,
        })
        .await?;
    if request.remember {
        store
            .remember_login(&RememberedLogin {
                name,
                warehouse_key,
                is_admin: result.is_admin.unwrap_or(false),
                saved_at: now,
            })
            .await?;
    } else {
        store.forget_login().await;
    }
    info!("Login accepted for '{}'", request.name);
    Ok(with_session(&session, Json(result)))
}

/// Remembered login of the caller's session; `null` without a session.
async fn remembered_login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Option<RememberedLogin>>> {
    let remembered = match request_session(&headers)? {
        Some(session) => state.sessions.for_session(&session).load_remembered_login().await?,
        None => None,
    };
    Ok(Json(remembered))
}

// --- Router ---

pub fn router(state: AppState) -> Router {
    let attendance_router = Router::new()
        .route("/ranking", get(attendance_ranking))
        .route("/all", get(attendance_all))
        .route("/snapshot", get(attendance_snapshot))
        .route("/range", get(attendance_range))
        .route("/day", get(attendance_day));

    let export_router = Router::new()
        .route("/csv", get(export_csv))
        .route("/html", get(export_html));

    let api_router = Router::new()
        .route("/sheets", get(list_sheets))
        .route("/sheet", get(get_sheet))
        .route("/leave-tags", get(leave_tags))
        .route("/warehouse-id", get(warehouse_id))
        .route("/warehouse-by-name", get(warehouse_by_name))
        .route("/login", post(login))
        .route("/login/remembered", get(remembered_login))
        .nest("/attendance", attendance_router)
        .nest("/export", export_router);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, address: &str) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on http://{}", address);
    axum::serve(listener, app).await
}
