//! Billing splitter handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{Bill, BillingSplit, BillingSplitDraft, SplitOutcome};

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request for a non-committing split preview.
#[derive(Debug, Deserialize)]
pub struct SplitPreviewRequest {
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub ordered_quantity: Decimal,
    /// Priority order of candidate lines (the order contracts were attached
    /// to the order). Defaults to every supplying line, ascending line id.
    pub candidate_line_ids: Option<Vec<Uuid>>,
}

/// Request to persist split drafts as a bill.
#[derive(Debug, Deserialize)]
pub struct RegisterBillRequest {
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub splits: Vec<BillingSplitDraft>,
}

/// A bill with its persisted splits.
#[derive(Debug, Serialize)]
pub struct BillResponse {
    pub bill: Bill,
    pub splits: Vec<BillingSplit>,
}

/// Body for confirm/reverse split operations.
#[derive(Debug, Deserialize)]
pub struct SplitActionRequest {
    pub tenant_id: Uuid,
    pub responsible: String,
}

/// Parameters for bulk modality removal.
#[derive(Debug, Deserialize)]
pub struct RemovalParams {
    pub tenant_id: Uuid,
    pub responsible: String,
}

/// Outcome of a bulk modality removal.
#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub removed_splits: usize,
    pub new_total: Decimal,
}

// ============================================================================
// Handlers
// ============================================================================

/// Preview how an ordered quantity splits across supplying lines.
///
/// POST /billing/split
pub async fn split_preview(
    State(state): State<AppState>,
    Json(req): Json<SplitPreviewRequest>,
) -> Result<Json<SplitOutcome>, AppError> {
    Ok(Json(state.billing.split_order_quantity(
        req.tenant_id,
        req.order_id,
        req.product_id,
        req.ordered_quantity,
        req.candidate_line_ids,
    )?))
}

/// Persist split drafts as a bill.
///
/// POST /billing/bills
pub async fn register_bill(
    State(state): State<AppState>,
    Json(req): Json<RegisterBillRequest>,
) -> Result<(StatusCode, Json<BillResponse>), AppError> {
    let (bill, splits) = state
        .billing
        .register_bill(req.tenant_id, req.order_id, req.splits)?;
    Ok((StatusCode::CREATED, Json(BillResponse { bill, splits })))
}

/// Confirm a split's consumption.
///
/// POST /billing/splits/:split_id/confirm
pub async fn confirm_split(
    State(state): State<AppState>,
    Path(split_id): Path<Uuid>,
    Json(req): Json<SplitActionRequest>,
) -> Result<Json<BillingSplit>, AppError> {
    let split = state
        .billing
        .confirm_split_consumption(req.tenant_id, split_id, &req.responsible)
        .await?;
    Ok(Json(split))
}

/// Reverse a confirmed split's consumption.
///
/// POST /billing/splits/:split_id/reverse
pub async fn reverse_split(
    State(state): State<AppState>,
    Path(split_id): Path<Uuid>,
    Json(req): Json<SplitActionRequest>,
) -> Result<Json<BillingSplit>, AppError> {
    let split = state
        .billing
        .reverse_split_consumption(req.tenant_id, split_id, &req.responsible)
        .await?;
    Ok(Json(split))
}

/// Remove every split of one modality from a bill.
///
/// DELETE /billing/bills/:bill_id/modalities/:modality_id
pub async fn remove_modality_splits(
    State(state): State<AppState>,
    Path((bill_id, modality_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<RemovalParams>,
) -> Result<Json<RemovalResponse>, AppError> {
    let (removed_splits, new_total) = state
        .billing
        .remove_modality_splits(params.tenant_id, bill_id, modality_id, &params.responsible)
        .await?;
    Ok(Json(RemovalResponse {
        removed_splits,
        new_total,
    }))
}
