//! Modality allocation handlers.

use axum::extract::{Json, State};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{ModalityAllocation, SetAllocation};

/// Request to create or edit a modality allocation's initial quantity.
#[derive(Debug, Deserialize)]
pub struct SetAllocationRequest {
    pub tenant_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_id: Uuid,
    pub modality_name: String,
    pub financial_code: Option<String>,
    pub initial_quantity: Decimal,
}

/// Allocation response with its derived availability.
#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub allocation_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_id: Uuid,
    pub modality_name: String,
    pub financial_code: Option<String>,
    pub initial_quantity: Decimal,
    pub consumed_quantity: Decimal,
    pub available_quantity: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl From<ModalityAllocation> for AllocationResponse {
    fn from(allocation: ModalityAllocation) -> Self {
        let available = allocation.available_quantity();
        Self {
            allocation_id: allocation.allocation_id,
            contract_line_id: allocation.contract_line_id,
            modality_id: allocation.modality_id,
            modality_name: allocation.modality_name,
            financial_code: allocation.financial_code,
            initial_quantity: allocation.initial_quantity,
            consumed_quantity: allocation.consumed_quantity,
            available_quantity: available,
            created_utc: allocation.created_utc,
        }
    }
}

/// Create or edit a (line, modality) allocation.
///
/// PUT /allocations
pub async fn set_allocation(
    State(state): State<AppState>,
    Json(req): Json<SetAllocationRequest>,
) -> Result<Json<AllocationResponse>, AppError> {
    let allocation = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id: req.tenant_id,
            contract_line_id: req.contract_line_id,
            modality_id: req.modality_id,
            modality_name: req.modality_name,
            financial_code: req.financial_code,
            initial_quantity: req.initial_quantity,
        })
        .await?;
    Ok(Json(allocation.into()))
}
