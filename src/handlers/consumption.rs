//! Consumption ledger handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{
    BalanceSnapshot, ConsumptionEvent, ConsumptionTarget, HistoryEntry, RecordConsumption,
};

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to record a consumption against a line or an allocation.
#[derive(Debug, Deserialize)]
pub struct RecordConsumptionRequest {
    pub tenant_id: Uuid,
    pub target: ConsumptionTarget,
    pub quantity: Decimal,
    pub responsible: String,
    pub note: Option<String>,
}

/// Request to reverse a consumption event.
#[derive(Debug, Deserialize)]
pub struct ReverseConsumptionRequest {
    pub tenant_id: Uuid,
    pub responsible: String,
}

/// Outcome of a record/reverse operation: the event and the target's
/// updated balance.
#[derive(Debug, Serialize)]
pub struct ConsumptionResponse {
    pub event_id: Uuid,
    pub target: ConsumptionTarget,
    pub quantity: Decimal,
    pub reversed: bool,
    pub balance: BalanceSnapshot,
}

impl ConsumptionResponse {
    fn from_parts(event: ConsumptionEvent, balance: BalanceSnapshot) -> Self {
        Self {
            event_id: event.event_id,
            target: event.target,
            quantity: event.quantity,
            reversed: event.reversed,
            balance,
        }
    }
}

/// Parameters for the consumption history query, as they arrive on the
/// wire: the target is flattened into `kind` + `id`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub tenant_id: Uuid,
    pub kind: String,
    pub id: Uuid,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn default_page_size() -> i32 {
    50
}

// ============================================================================
// Handlers
// ============================================================================

/// Record a consumption.
///
/// POST /consumptions
pub async fn record_consumption(
    State(state): State<AppState>,
    Json(req): Json<RecordConsumptionRequest>,
) -> Result<(StatusCode, Json<ConsumptionResponse>), AppError> {
    let (event, balance) = state
        .ledger
        .record_consumption(RecordConsumption {
            tenant_id: req.tenant_id,
            target: req.target,
            quantity: req.quantity,
            responsible: req.responsible,
            note: req.note,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ConsumptionResponse::from_parts(event, balance)),
    ))
}

/// Reverse a consumption event by id.
///
/// POST /consumptions/:event_id/reverse
pub async fn reverse_consumption(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<ReverseConsumptionRequest>,
) -> Result<Json<ConsumptionResponse>, AppError> {
    let (event, balance) = state
        .ledger
        .reverse_consumption(req.tenant_id, event_id, &req.responsible)
        .await?;
    Ok(Json(ConsumptionResponse::from_parts(event, balance)))
}

/// Consumption history for a line or an allocation, newest first.
///
/// GET /consumptions?tenant_id=..&kind=line|allocation&id=..
pub async fn consumption_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let target = match params.kind.as_str() {
        "line" => ConsumptionTarget::Line {
            contract_line_id: params.id,
        },
        "allocation" => ConsumptionTarget::Allocation {
            allocation_id: params.id,
        },
        other => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "unknown target kind '{}'",
                other
            )))
        }
    };
    Ok(Json(state.ledger.history(
        params.tenant_id,
        target,
        params.page_size,
        params.page_token,
    )?))
}
