//! Consumption event model: the append-only ledger entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a consumption event debits: a contract line directly, or one of its
/// modality allocations. Exactly one, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumptionTarget {
    Line { contract_line_id: Uuid },
    Allocation { allocation_id: Uuid },
}

impl std::fmt::Display for ConsumptionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line { contract_line_id } => write!(f, "line:{}", contract_line_id),
            Self::Allocation { allocation_id } => write!(f, "allocation:{}", allocation_id),
        }
    }
}

/// A single debit against an available quantity, or its inert reversed form.
///
/// Events are never mutated after posting except for flipping `reversed`;
/// a reversed event's quantity is fully restored to the target and the
/// event stays in the history for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub target: ConsumptionTarget,
    pub quantity: Decimal,
    pub posted_utc: DateTime<Utc>,
    /// Monotonic posting order, used for a stable newest-first history.
    pub sequence: u64,
    pub responsible: String,
    pub note: Option<String>,
    pub reversed: bool,
}

/// Input for recording a consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConsumption {
    pub tenant_id: Uuid,
    pub target: ConsumptionTarget,
    pub quantity: Decimal,
    pub responsible: String,
    pub note: Option<String>,
}

/// Consumption-history row, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub event_id: Uuid,
    pub date: DateTime<Utc>,
    pub quantity: Decimal,
    pub responsible: String,
    pub note: Option<String>,
    pub reversed: bool,
}

impl From<&ConsumptionEvent> for HistoryEntry {
    fn from(event: &ConsumptionEvent) -> Self {
        Self {
            event_id: event.event_id,
            date: event.posted_utc,
            quantity: event.quantity,
            responsible: event.responsible.clone(),
            note: event.note.clone(),
            reversed: event.reversed,
        }
    }
}
