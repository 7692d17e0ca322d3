//! Contract line model and balance views.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::BalanceStatus;

/// One priced product within a supplier contract, as supplied by the
/// upstream contract-management collaborator. Metadata is read-only here;
/// only consumption state ever changes inside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractLine {
    pub contract_line_id: Uuid,
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub contract_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub contracted_quantity: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering (or re-syncing) a contract line from upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterContractLine {
    pub contract_line_id: Uuid,
    pub tenant_id: Uuid,
    pub contract_id: Uuid,
    pub contract_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub contracted_quantity: Decimal,
}

/// Point-in-time balance for one target (line or allocation), returned by
/// every mutating ledger operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub capacity: Decimal,
    pub consumed_quantity: Decimal,
    pub available_quantity: Decimal,
    pub status: BalanceStatus,
}

/// Row of the contract-balance listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBalanceView {
    pub contract_line_id: Uuid,
    pub contract_id: Uuid,
    pub contract_number: String,
    pub supplier_name: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub contracted_quantity: Decimal,
    pub consumed_quantity: Decimal,
    pub available_quantity: Decimal,
    pub status: BalanceStatus,
}
