//! Billing splitter: distributes an order's quantity across the contract
//! lines and modality allocations that supply the product, and keeps
//! persisted splits in lockstep with the consumption ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Bill, BillingSplit, BillingSplitDraft, ConsumptionTarget, RecordConsumption, SplitOutcome,
};
use crate::services::ledger::ConsumptionLedger;
use crate::services::metrics::SPLITS_TOTAL;
use crate::services::store::BalanceStore;

#[derive(Clone)]
pub struct BillingSplitter {
    store: Arc<BalanceStore>,
    ledger: ConsumptionLedger,
}

impl BillingSplitter {
    pub fn new(store: Arc<BalanceStore>, ledger: ConsumptionLedger) -> Self {
        Self { store, ledger }
    }

    /// Preview how an ordered quantity splits across the supplying lines.
    ///
    /// Candidate lines are taken in the caller-supplied priority order (the
    /// order contracts were attached to the order) when given, otherwise
    /// every line of the tenant supplying the product, ascending line id.
    /// Within a line, allocations are taken in creation order, each capped
    /// at its own available quantity. Nothing is posted to the ledger; an
    /// unsatisfied remainder is reported, not raised.
    #[instrument(skip(self, candidate_line_ids), fields(tenant_id = %tenant_id, order_id = %order_id, product_id = %product_id, ordered_quantity = %ordered_quantity))]
    pub fn split_order_quantity(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        ordered_quantity: Decimal,
        candidate_line_ids: Option<Vec<Uuid>>,
    ) -> Result<SplitOutcome, AppError> {
        if ordered_quantity <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!(
                "ordered quantity must be positive, got {}",
                ordered_quantity
            )));
        }

        let candidates = match candidate_line_ids {
            Some(ids) => {
                // A repeated candidate would be sized against the same
                // un-debited availability twice; first occurrence wins.
                let mut seen = HashSet::with_capacity(ids.len());
                let mut lines = Vec::with_capacity(ids.len());
                for id in ids {
                    if !seen.insert(id) {
                        continue;
                    }
                    let line = self
                        .store
                        .line(tenant_id, id)
                        .ok_or(AppError::LineNotFound(id))?;
                    if line.product_id != product_id {
                        return Err(AppError::BadRequest(anyhow::anyhow!(
                            "contract line {} supplies a different product",
                            id
                        )));
                    }
                    lines.push(line);
                }
                lines
            }
            None => self.store.lines_for_product(tenant_id, product_id),
        };

        let mut remaining = ordered_quantity;
        let mut splits = Vec::new();

        for line in candidates {
            if remaining.is_zero() {
                break;
            }

            let allocations = self
                .store
                .allocations_for_line(tenant_id, line.contract_line_id);

            if allocations.is_empty() {
                let available = self
                    .store
                    .line_snapshot(tenant_id, line.contract_line_id)
                    .map(|s| s.available_quantity)
                    .unwrap_or(Decimal::ZERO);
                if available <= Decimal::ZERO {
                    continue;
                }
                let quantity = remaining.min(available);
                splits.push(self.draft(&line, None, quantity, ordered_quantity));
                remaining -= quantity;
            } else {
                // A line with allocations is consumable only through them,
                // so its usable headroom is the allocations' availability.
                for allocation in allocations {
                    if remaining.is_zero() {
                        break;
                    }
                    let available = allocation.available_quantity();
                    if available <= Decimal::ZERO {
                        continue;
                    }
                    let quantity = remaining.min(available);
                    splits.push(self.draft(
                        &line,
                        Some(allocation.allocation_id),
                        quantity,
                        ordered_quantity,
                    ));
                    remaining -= quantity;
                }
            }
        }

        let outcome_label = if remaining.is_zero() { "full" } else { "partial" };
        SPLITS_TOTAL.with_label_values(&[outcome_label]).inc();
        info!(
            split_count = splits.len(),
            unsatisfied_remainder = %remaining,
            "Order quantity split"
        );

        Ok(SplitOutcome {
            order_id,
            product_id,
            ordered_quantity,
            splits,
            unsatisfied_remainder: remaining,
        })
    }

    /// Persist split drafts as a bill. All splits start unconfirmed; the
    /// ledger is untouched until each split's consumption is confirmed.
    #[instrument(skip(self, drafts), fields(tenant_id = %tenant_id, order_id = %order_id, split_count = drafts.len()))]
    pub fn register_bill(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        drafts: Vec<BillingSplitDraft>,
    ) -> Result<(Bill, Vec<BillingSplit>), AppError> {
        if drafts.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "a bill needs at least one split"
            )));
        }

        for draft in &drafts {
            self.store
                .line(tenant_id, draft.contract_line_id)
                .ok_or(AppError::LineNotFound(draft.contract_line_id))?;
            if let Some(allocation_id) = draft.modality_allocation_id {
                self.store
                    .allocation(tenant_id, allocation_id)
                    .ok_or(AppError::AllocationNotFound(allocation_id))?;
            }
            if draft.quantity <= Decimal::ZERO {
                return Err(AppError::InvalidQuantity(format!(
                    "split quantity must be positive, got {}",
                    draft.quantity
                )));
            }
        }

        let bill_id = Uuid::new_v4();
        let now = Utc::now();
        let mut total = Decimal::ZERO;
        let mut splits = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let split = BillingSplit {
                split_id: Uuid::new_v4(),
                tenant_id,
                bill_id,
                order_id,
                product_id: draft.product_id,
                contract_line_id: draft.contract_line_id,
                modality_allocation_id: draft.modality_allocation_id,
                quantity: draft.quantity,
                unit_price: draft.unit_price,
                percentage_of_ordered_quantity: draft.percentage_of_ordered_quantity,
                consumption_confirmed: false,
                confirmation_date: None,
                consumption_event_id: None,
                created_utc: now,
            };
            total += split.line_total();
            self.store.insert_split(split.clone());
            splits.push(split);
        }

        let bill = Bill {
            bill_id,
            tenant_id,
            order_id,
            total_amount: total.round_dp(2),
            created_utc: now,
        };
        self.store.insert_bill(bill.clone());

        info!(bill_id = %bill_id, total_amount = %bill.total_amount, "Bill registered");
        Ok((bill, splits))
    }

    /// Confirm a split's consumption: posts the matching ledger event and
    /// flips the split to confirmed, atomically under the line lock.
    /// An insufficient balance (consumed elsewhere since the split was
    /// created) propagates unchanged and leaves the split unconfirmed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, split_id = %split_id))]
    pub async fn confirm_split_consumption(
        &self,
        tenant_id: Uuid,
        split_id: Uuid,
        responsible: &str,
    ) -> Result<BillingSplit, AppError> {
        let split = self
            .store
            .split(tenant_id, split_id)
            .ok_or(AppError::SplitNotFound(split_id))?;

        let lock = self.store.line_lock(tenant_id, split.contract_line_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent confirm may have won.
        let split = self
            .store
            .split(tenant_id, split_id)
            .ok_or(AppError::SplitNotFound(split_id))?;
        if split.consumption_confirmed {
            return Err(AppError::SplitAlreadyConfirmed(split_id));
        }

        let target = match split.modality_allocation_id {
            Some(allocation_id) => ConsumptionTarget::Allocation { allocation_id },
            None => ConsumptionTarget::Line {
                contract_line_id: split.contract_line_id,
            },
        };

        let (event, _) = self.ledger.record_locked(RecordConsumption {
            tenant_id,
            target,
            quantity: split.quantity,
            responsible: responsible.to_string(),
            note: Some(format!("billing split for order {}", split.order_id)),
        })?;

        let confirmed = BillingSplit {
            consumption_confirmed: true,
            confirmation_date: Some(Utc::now()),
            consumption_event_id: Some(event.event_id),
            ..split
        };
        self.store.update_split(confirmed.clone());

        info!(event_id = %event.event_id, "Billing split consumption confirmed");
        Ok(confirmed)
    }

    /// Reverse a confirmed split's consumption: reverses exactly the event
    /// the confirm created and clears the confirmation fields.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, split_id = %split_id))]
    pub async fn reverse_split_consumption(
        &self,
        tenant_id: Uuid,
        split_id: Uuid,
        responsible: &str,
    ) -> Result<BillingSplit, AppError> {
        let split = self
            .store
            .split(tenant_id, split_id)
            .ok_or(AppError::SplitNotFound(split_id))?;

        let lock = self.store.line_lock(tenant_id, split.contract_line_id);
        let _guard = lock.lock().await;

        let split = self
            .store
            .split(tenant_id, split_id)
            .ok_or(AppError::SplitNotFound(split_id))?;
        if !split.consumption_confirmed {
            return Err(AppError::SplitNotConfirmed(split_id));
        }
        let event_id = split
            .consumption_event_id
            .ok_or_else(|| anyhow::anyhow!("confirmed split {} has no ledger event", split_id))?;

        self.ledger.reverse_locked(tenant_id, event_id, responsible)?;

        let reversed = BillingSplit {
            consumption_confirmed: false,
            confirmation_date: None,
            consumption_event_id: None,
            ..split
        };
        self.store.update_split(reversed.clone());

        info!(event_id = %event_id, "Billing split consumption reversed");
        Ok(reversed)
    }

    /// Remove every split of one modality from a bill, as one transaction:
    /// confirmed splits get their events reversed before any split record is
    /// deleted, and the bill total is recomputed at the end. All affected
    /// contract lines stay locked (in sorted order) for the duration, so a
    /// partial state is never observable.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, bill_id = %bill_id, modality_id = %modality_id))]
    pub async fn remove_modality_splits(
        &self,
        tenant_id: Uuid,
        bill_id: Uuid,
        modality_id: Uuid,
        responsible: &str,
    ) -> Result<(usize, Decimal), AppError> {
        let bill = self
            .store
            .bill(tenant_id, bill_id)
            .ok_or(AppError::BillNotFound(bill_id))?;

        // Identify affected splits by resolving each split's allocation to
        // its modality.
        let mut affected_ids = Vec::new();
        let mut line_ids = Vec::new();
        for split in self.store.splits_for_bill(tenant_id, bill_id) {
            let Some(allocation_id) = split.modality_allocation_id else {
                continue;
            };
            let allocation = self
                .store
                .allocation(tenant_id, allocation_id)
                .ok_or(AppError::AllocationNotFound(allocation_id))?;
            if allocation.modality_id == modality_id {
                affected_ids.push(split.split_id);
                line_ids.push(split.contract_line_id);
            }
        }

        if affected_ids.is_empty() {
            return Ok((0, bill.total_amount));
        }

        // Lock every affected line in sorted order to keep lock acquisition
        // deadlock-free.
        line_ids.sort();
        line_ids.dedup();
        let mut guards = Vec::with_capacity(line_ids.len());
        for line_id in &line_ids {
            let lock = self.store.line_lock(tenant_id, *line_id);
            guards.push(lock.lock_owned().await);
        }

        // Validate everything before mutating anything: with the locks held
        // no other writer can invalidate these checks mid-removal.
        let mut to_remove = Vec::with_capacity(affected_ids.len());
        for split_id in &affected_ids {
            let split = self
                .store
                .split(tenant_id, *split_id)
                .ok_or(AppError::SplitNotFound(*split_id))?;
            if split.consumption_confirmed {
                let event_id = split.consumption_event_id.ok_or_else(|| {
                    anyhow::anyhow!("confirmed split {} has no ledger event", split_id)
                })?;
                let event = self
                    .store
                    .event(tenant_id, event_id)
                    .ok_or(AppError::EventNotFound(event_id))?;
                if event.reversed {
                    return Err(AppError::EventAlreadyReversed(event_id));
                }
            }
            to_remove.push(split);
        }

        for split in &to_remove {
            if split.consumption_confirmed {
                let event_id = split.consumption_event_id.ok_or_else(|| {
                    anyhow::anyhow!("confirmed split {} has no ledger event", split.split_id)
                })?;
                self.ledger
                    .reverse_locked(tenant_id, event_id, responsible)?;
            }
            self.store.remove_split(tenant_id, split.split_id);
        }

        let new_total: Decimal = self
            .store
            .splits_for_bill(tenant_id, bill_id)
            .iter()
            .map(BillingSplit::line_total)
            .sum::<Decimal>()
            .round_dp(2);
        self.store.set_bill_total(tenant_id, bill_id, new_total);

        info!(
            removed = to_remove.len(),
            new_total = %new_total,
            "Modality splits removed from bill"
        );
        Ok((to_remove.len(), new_total))
    }

    fn draft(
        &self,
        line: &crate::models::ContractLine,
        modality_allocation_id: Option<Uuid>,
        quantity: Decimal,
        ordered_quantity: Decimal,
    ) -> BillingSplitDraft {
        BillingSplitDraft {
            product_id: line.product_id,
            contract_line_id: line.contract_line_id,
            modality_allocation_id,
            quantity,
            unit_price: line.unit_price,
            line_total: (quantity * line.unit_price).round_dp(2),
            percentage_of_ordered_quantity: (quantity / ordered_quantity
                * Decimal::ONE_HUNDRED)
                .round_dp(2),
        }
    }
}
