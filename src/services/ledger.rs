//! Consumption ledger: records and reverses consumption events.
//!
//! Every mutation runs under the parent contract line's write lock, so the
//! availability check and the balance write are one atomic unit; two
//! concurrent consumptions can never both pass the check against a stale
//! balance.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    BalanceSnapshot, ConsumptionEvent, ConsumptionTarget, HistoryEntry, RecordConsumption,
};
use crate::services::metrics::{CONSUMPTIONS_TOTAL, REVERSALS_TOTAL};
use crate::services::store::BalanceStore;

#[derive(Clone)]
pub struct ConsumptionLedger {
    store: Arc<BalanceStore>,
}

impl ConsumptionLedger {
    pub fn new(store: Arc<BalanceStore>) -> Self {
        Self { store }
    }

    /// Record a consumption against a line or an allocation.
    ///
    /// Returns the posted event together with the target's updated balance
    /// snapshot.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, target = %input.target, quantity = %input.quantity))]
    pub async fn record_consumption(
        &self,
        input: RecordConsumption,
    ) -> Result<(ConsumptionEvent, BalanceSnapshot), AppError> {
        let line_id = self.parent_line(input.tenant_id, input.target)?;
        let lock = self.store.line_lock(input.tenant_id, line_id);
        let _guard = lock.lock().await;
        self.record_locked(input)
    }

    /// Reverse a previously recorded event, restoring its quantity to the
    /// target. The event stays in the history, flagged as reversed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, event_id = %event_id))]
    pub async fn reverse_consumption(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        responsible: &str,
    ) -> Result<(ConsumptionEvent, BalanceSnapshot), AppError> {
        let event = self
            .store
            .event(tenant_id, event_id)
            .ok_or(AppError::EventNotFound(event_id))?;
        let line_id = self.parent_line(tenant_id, event.target)?;
        let lock = self.store.line_lock(tenant_id, line_id);
        let _guard = lock.lock().await;
        self.reverse_locked(tenant_id, event_id, responsible)
    }

    /// Consumption history for a target, newest first, cursor-paged on
    /// event id.
    pub fn history(
        &self,
        tenant_id: Uuid,
        target: ConsumptionTarget,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        self.parent_line(tenant_id, target)?;

        let limit = page_size.clamp(1, 100) as usize;
        let events = self.store.events_for_target(tenant_id, target);
        let start = match page_token {
            Some(cursor) => match events.iter().position(|e| e.event_id == cursor) {
                Some(idx) => idx + 1,
                None => return Err(AppError::EventNotFound(cursor)),
            },
            None => 0,
        };

        Ok(events
            .iter()
            .skip(start)
            .take(limit)
            .map(HistoryEntry::from)
            .collect())
    }

    /// Core record path. Caller holds the parent line's lock.
    pub(crate) fn record_locked(
        &self,
        input: RecordConsumption,
    ) -> Result<(ConsumptionEvent, BalanceSnapshot), AppError> {
        if input.quantity <= Decimal::ZERO {
            CONSUMPTIONS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::InvalidQuantity(format!(
                "consumption quantity must be positive, got {}",
                input.quantity
            )));
        }

        let available = match input.target {
            ConsumptionTarget::Line { contract_line_id } => {
                let snapshot = self
                    .store
                    .line_snapshot(input.tenant_id, contract_line_id)
                    .ok_or(AppError::LineNotFound(contract_line_id))?;
                // Once any allocation exists, consumption goes through the
                // allocations; direct line consumption would double-claim
                // the same contracted quantity.
                if !self
                    .store
                    .allocations_for_line(input.tenant_id, contract_line_id)
                    .is_empty()
                {
                    CONSUMPTIONS_TOTAL.with_label_values(&["rejected"]).inc();
                    return Err(AppError::LineHasAllocations(contract_line_id));
                }
                snapshot.available_quantity
            }
            ConsumptionTarget::Allocation { allocation_id } => self
                .store
                .allocation(input.tenant_id, allocation_id)
                .ok_or(AppError::AllocationNotFound(allocation_id))?
                .available_quantity(),
        };

        if input.quantity > available {
            CONSUMPTIONS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::InsufficientBalance {
                requested: input.quantity,
                available,
            });
        }

        let event = ConsumptionEvent {
            event_id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            target: input.target,
            quantity: input.quantity,
            posted_utc: Utc::now(),
            sequence: self.store.next_sequence(),
            responsible: input.responsible,
            note: input.note,
            reversed: false,
        };

        match input.target {
            ConsumptionTarget::Line { contract_line_id } => {
                self.store
                    .add_line_consumed(input.tenant_id, contract_line_id, input.quantity);
            }
            ConsumptionTarget::Allocation { allocation_id } => {
                self.store
                    .add_allocation_consumed(input.tenant_id, allocation_id, input.quantity);
            }
        }
        self.store.insert_event(event.clone());

        let snapshot = self
            .snapshot_for(input.tenant_id, input.target)
            .ok_or_else(|| anyhow::anyhow!("balance vanished while holding the line lock"))?;

        CONSUMPTIONS_TOTAL.with_label_values(&["ok"]).inc();
        info!(
            event_id = %event.event_id,
            target = %event.target,
            quantity = %event.quantity,
            available = %snapshot.available_quantity,
            "Consumption recorded"
        );

        Ok((event, snapshot))
    }

    /// Core reversal path. Caller holds the parent line's lock.
    pub(crate) fn reverse_locked(
        &self,
        tenant_id: Uuid,
        event_id: Uuid,
        responsible: &str,
    ) -> Result<(ConsumptionEvent, BalanceSnapshot), AppError> {
        // Re-read under the lock; a concurrent reversal may have won.
        let event = self
            .store
            .event(tenant_id, event_id)
            .ok_or(AppError::EventNotFound(event_id))?;
        if event.reversed {
            REVERSALS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::EventAlreadyReversed(event_id));
        }

        self.store.set_event_reversed(tenant_id, event_id);
        match event.target {
            ConsumptionTarget::Line { contract_line_id } => {
                self.store
                    .add_line_consumed(tenant_id, contract_line_id, -event.quantity);
            }
            ConsumptionTarget::Allocation { allocation_id } => {
                self.store
                    .add_allocation_consumed(tenant_id, allocation_id, -event.quantity);
            }
        }

        let snapshot = self
            .snapshot_for(tenant_id, event.target)
            .ok_or_else(|| anyhow::anyhow!("balance vanished while holding the line lock"))?;

        REVERSALS_TOTAL.with_label_values(&["ok"]).inc();
        info!(
            event_id = %event_id,
            target = %event.target,
            quantity = %event.quantity,
            responsible = responsible,
            "Consumption reversed"
        );

        let event = ConsumptionEvent {
            reversed: true,
            ..event
        };
        Ok((event, snapshot))
    }

    /// Resolve the contract line whose lock serializes writes for a target.
    fn parent_line(&self, tenant_id: Uuid, target: ConsumptionTarget) -> Result<Uuid, AppError> {
        match target {
            ConsumptionTarget::Line { contract_line_id } => {
                self.store
                    .line(tenant_id, contract_line_id)
                    .ok_or(AppError::LineNotFound(contract_line_id))?;
                Ok(contract_line_id)
            }
            ConsumptionTarget::Allocation { allocation_id } => Ok(self
                .store
                .allocation(tenant_id, allocation_id)
                .ok_or(AppError::AllocationNotFound(allocation_id))?
                .contract_line_id),
        }
    }

    fn snapshot_for(
        &self,
        tenant_id: Uuid,
        target: ConsumptionTarget,
    ) -> Option<BalanceSnapshot> {
        match target {
            ConsumptionTarget::Line { contract_line_id } => {
                self.store.line_snapshot(tenant_id, contract_line_id)
            }
            ConsumptionTarget::Allocation { allocation_id } => {
                self.store.allocation_snapshot(tenant_id, allocation_id)
            }
        }
    }
}
