//! API request handlers
//!
//! Every `/api/v1` handler logs the caller in from the bearer token, runs one
//! workflow operation and wraps the outcome in [`ApiResponse`].

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::server::AppState;
use crate::armory::{Armory, Receipt};
use crate::balance::{fetch_balances, BalanceReport, ItemKind};
use crate::error::ArmoryError;
use crate::ledger::{ItemBalance, Ledger, LedgerMove};
use crate::logistics::{LogisticsBoard, LogisticsView, OrderItem, RowKey};
use crate::parser::{self, Record};
use crate::session::Session;
use crate::transition::{Applied, Decision, PendingSignOut, SignatureCapture};
use crate::types::Status;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// An [`ArmoryError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ArmoryError);

impl From<ArmoryError> for ApiError {
    fn from(err: ArmoryError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ArmoryError::AuthExpired => StatusCode::UNAUTHORIZED,
            ArmoryError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ArmoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ArmoryError::Conflict(_) => StatusCode::CONFLICT,
            ArmoryError::NotFound(_) | ArmoryError::EmptyResult(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), "request failed: {}", self.0);
        } else {
            debug!(status = status.as_u16(), "request refused: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A missing token is treated like an expired one so clients re-login.
async fn session(state: &AppState, headers: &HeaderMap) -> Result<Arc<Session>, ApiError> {
    let token = bearer(headers).ok_or(ArmoryError::AuthExpired)?;
    Ok(state.sessions.authenticate(token).await?)
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Armory API Server".to_string(),
        version: state.version.clone(),
        description: "Armory inventory, sign-out and logistics over a shared spreadsheet".to_string(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint("GET", "/api/v1/sheets/{range}/records", "Parsed records of a tab"),
            endpoint("GET", "/api/v1/logistics/{unit}", "Status buckets and sign-out summary"),
            endpoint("POST", "/api/v1/logistics/{unit}/orders", "Submit an order"),
            endpoint("POST", "/api/v1/logistics/{unit}/transition", "Request a status change"),
            endpoint("POST", "/api/v1/logistics/{unit}/sign-out", "Complete a sign-out with a signature"),
            endpoint("POST", "/api/v1/logistics/{unit}/read", "Mark a row read or unread"),
            endpoint("GET", "/api/v1/balances", "Weapon and optics balances"),
            endpoint("GET", "/api/v1/equipment/{range}", "Equipment ledger balances"),
            endpoint("POST", "/api/v1/equipment/{range}/sign", "Sign equipment out"),
            endpoint("POST", "/api/v1/equipment/{range}/credit", "Credit equipment back"),
            endpoint("POST", "/api/v1/armory/issue", "Issue a serial to a roster row"),
            endpoint("POST", "/api/v1/armory/credit", "Return a roster row's weapon"),
            endpoint("POST", "/api/v1/armory/repair", "Move a serial to the defect log"),
            endpoint("POST", "/api/v1/armory/receive", "Bring a serial back from the defect log"),
            endpoint("POST", "/api/v1/armory/add", "Register a new serial in an inventory"),
            endpoint("POST", "/api/v1/armory/return-all", "Return everything a soldier holds"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: ["records", "logistics", "balances", "equipment", "armory"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }))
}

/// GET /api/v1/sheets/{range}/records
pub async fn records(
    State(state): State<Arc<AppState>>,
    Path(range): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Vec<Record>> {
    let session = session(&state, &headers).await?;
    let sheet = state.config.sheet(&range)?;
    session.require_readable(&state.config, &range)?;
    let grid = session.store().fetch_sheet(sheet).await?;
    Ok(Json(ApiResponse::ok(parser::parse(&grid))))
}

/// GET /api/v1/logistics/{unit}
pub async fn logistics_view(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    headers: HeaderMap,
) -> ApiResult<LogisticsView> {
    let session = session(&state, &headers).await?;
    let board = LogisticsBoard::new(&state.config, &session, &unit)?;
    Ok(Json(ApiResponse::ok(board.view().await?)))
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Default)]
pub struct OrderResponse {
    pub row_ids: Vec<String>,
}

/// POST /api/v1/logistics/{unit}/orders
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    headers: HeaderMap,
    Json(req): Json<OrderRequest>,
) -> ApiResult<OrderResponse> {
    let session = session(&state, &headers).await?;
    let board = LogisticsBoard::new(&state.config, &session, &unit)?;
    let row_ids = board.submit_order(&req.items).await?;
    Ok(Json(ApiResponse::ok(OrderResponse { row_ids })))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    #[serde(flatten)]
    pub key: RowKey,
    pub from: Status,
    pub to: Status,
}

/// POST /api/v1/logistics/{unit}/transition
///
/// A rejected transition is a successful request; the decision says what the
/// caller must revert to.
pub async fn transition(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Decision> {
    let session = session(&state, &headers).await?;
    let board = LogisticsBoard::new(&state.config, &session, &unit)?;
    let decision = board.transition(&req.key, req.from, req.to).await?;
    Ok(Json(ApiResponse::ok(decision)))
}

#[derive(Debug, Deserialize)]
pub struct SignOutRequest {
    pub pending: PendingSignOut,
    #[serde(flatten)]
    pub capture: SignatureCapture,
}

/// POST /api/v1/logistics/{unit}/sign-out
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SignOutRequest>,
) -> ApiResult<Applied> {
    let session = session(&state, &headers).await?;
    let board = LogisticsBoard::new(&state.config, &session, &unit)?;
    let applied = board.complete_sign_out(&req.pending, &req.capture).await?;
    Ok(Json(ApiResponse::ok(applied)))
}

#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    #[serde(flatten)]
    pub key: RowKey,
    pub read: bool,
}

#[derive(Debug, Serialize, Default)]
pub struct RowResponse {
    pub row: usize,
}

/// POST /api/v1/logistics/{unit}/read
pub async fn read_flag(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReadRequest>,
) -> ApiResult<RowResponse> {
    let session = session(&state, &headers).await?;
    let board = LogisticsBoard::new(&state.config, &session, &unit)?;
    let row = board.set_read_flag(&req.key, req.read).await?;
    Ok(Json(ApiResponse::ok(RowResponse { row })))
}

/// GET /api/v1/balances
pub async fn balances(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<BalanceReport> {
    let session = session(&state, &headers).await?;
    let report = fetch_balances(&state.config, session.store().clone()).await?;
    Ok(Json(ApiResponse::ok(report)))
}

#[derive(Debug, Serialize, Default)]
pub struct EquipmentResponse {
    pub records: Vec<Record>,
    pub balances: Vec<ItemBalance>,
}

/// GET /api/v1/equipment/{range}
pub async fn equipment(
    State(state): State<Arc<AppState>>,
    Path(range): Path<String>,
    headers: HeaderMap,
) -> ApiResult<EquipmentResponse> {
    let session = session(&state, &headers).await?;
    let ledger = Ledger::new(&state.config, &session, &range)?;
    let records = ledger.records().await?;
    let balances = crate::ledger::balances(&records, &state.config.equipment_columns);
    Ok(Json(ApiResponse::ok(EquipmentResponse { records, balances })))
}

/// POST /api/v1/equipment/{range}/sign
pub async fn equipment_sign(
    State(state): State<Arc<AppState>>,
    Path(range): Path<String>,
    headers: HeaderMap,
    Json(entry): Json<LedgerMove>,
) -> ApiResult<Vec<ItemBalance>> {
    let session = session(&state, &headers).await?;
    let ledger = Ledger::new(&state.config, &session, &range)?;
    ledger.sign(&entry).await?;
    Ok(Json(ApiResponse::ok(ledger.balances().await?)))
}

/// POST /api/v1/equipment/{range}/credit
pub async fn equipment_credit(
    State(state): State<Arc<AppState>>,
    Path(range): Path<String>,
    headers: HeaderMap,
    Json(entry): Json<LedgerMove>,
) -> ApiResult<Vec<ItemBalance>> {
    let session = session(&state, &headers).await?;
    let ledger = Ledger::new(&state.config, &session, &range)?;
    ledger.credit(&entry).await?;
    Ok(Json(ApiResponse::ok(ledger.balances().await?)))
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub unit: String,
    pub row: usize,
    pub kind: ItemKind,
    pub item_type: String,
    pub serial: String,
}

/// POST /api/v1/armory/issue
pub async fn armory_issue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IssueRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let armory = Armory::new(&state.config, &session);
    let receipt = match req.kind {
        ItemKind::Weapon => armory.issue_serial(&req.unit, req.row, &req.item_type, &req.serial).await?,
        ItemKind::Optic => armory.issue_optic(&req.unit, req.row, &req.item_type, &req.serial).await?,
    };
    Ok(Json(ApiResponse::ok(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub unit: String,
    pub row: usize,
}

/// POST /api/v1/armory/credit
pub async fn armory_credit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreditRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let receipt = Armory::new(&state.config, &session)
        .credit_serial(&req.unit, req.row)
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct SerialRequest {
    pub kind: ItemKind,
    pub item_type: String,
    pub serial: String,
}

/// POST /api/v1/armory/repair
pub async fn armory_repair(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SerialRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let receipt = Armory::new(&state.config, &session)
        .send_to_repair(req.kind, &req.item_type, &req.serial)
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// POST /api/v1/armory/receive
pub async fn armory_receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SerialRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let receipt = Armory::new(&state.config, &session)
        .receive_from_repair(req.kind, &req.item_type, &req.serial)
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// POST /api/v1/armory/add
pub async fn armory_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SerialRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let receipt = Armory::new(&state.config, &session)
        .add_serial(req.kind, &req.item_type, &req.serial)
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct ReturnAllRequest {
    pub unit: String,
    pub full_name: String,
}

/// POST /api/v1/armory/return-all
pub async fn armory_return_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReturnAllRequest>,
) -> ApiResult<Receipt> {
    let session = session(&state, &headers).await?;
    let receipt = Armory::new(&state.config, &session)
        .return_all(&req.unit, &req.full_name)
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}
