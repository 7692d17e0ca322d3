//! Modality allocation model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::BalanceStatus;

/// A funding modality's claim on part of a contract line's quantity.
///
/// Absence of a record for a (line, modality) pair is a valid state distinct
/// from an explicit zero allocation; lookups return `Option` rather than a
/// zeroed sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityAllocation {
    pub allocation_id: Uuid,
    pub tenant_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_id: Uuid,
    pub modality_name: String,
    pub financial_code: Option<String>,
    /// Mutable by an authorized edit, never by consumption.
    pub initial_quantity: Decimal,
    pub consumed_quantity: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl ModalityAllocation {
    pub fn available_quantity(&self) -> Decimal {
        self.initial_quantity - self.consumed_quantity
    }
}

/// Input for creating or editing a modality allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAllocation {
    pub tenant_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_id: Uuid,
    pub modality_name: String,
    pub financial_code: Option<String>,
    pub initial_quantity: Decimal,
}

/// Row of the per-modality balance listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityBalanceView {
    pub allocation_id: Uuid,
    pub contract_line_id: Uuid,
    pub product_name: String,
    pub modality_id: Uuid,
    pub modality_name: String,
    pub financial_code: Option<String>,
    pub initial_quantity: Decimal,
    pub consumed_quantity: Decimal,
    pub available_quantity: Decimal,
    pub status: BalanceStatus,
}
