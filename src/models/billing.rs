//! Billing split and bill models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a split preview: the portion of an order's quantity for one
/// product satisfied by one (contract line, modality allocation) pair.
/// Drafts are not posted to the ledger and hold no ids of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSplitDraft {
    pub product_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_allocation_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub percentage_of_ordered_quantity: Decimal,
}

/// Result of a split preview. A remainder is a reported outcome, not an
/// error; the caller decides whether partial fulfillment is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub ordered_quantity: Decimal,
    pub splits: Vec<BillingSplitDraft>,
    pub unsatisfied_remainder: Decimal,
}

/// A persisted billing split. `consumption_event_id` is the ledger event
/// created by the matching confirm, kept so a later reverse targets exactly
/// that event; split record and ledger stay in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSplit {
    pub split_id: Uuid,
    pub tenant_id: Uuid,
    pub bill_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub contract_line_id: Uuid,
    pub modality_allocation_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub percentage_of_ordered_quantity: Decimal,
    pub consumption_confirmed: bool,
    pub confirmation_date: Option<DateTime<Utc>>,
    pub consumption_event_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl BillingSplit {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// A generated bill grouping persisted splits for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub bill_id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub total_amount: Decimal,
    pub created_utc: DateTime<Utc>,
}
