//! Allocation engine: creates and edits modality allocations while
//! enforcing the line-level allocation invariant.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ModalityAllocation, SetAllocation};
use crate::services::metrics::ALLOCATION_EDITS_TOTAL;
use crate::services::store::BalanceStore;

#[derive(Clone)]
pub struct AllocationEngine {
    store: Arc<BalanceStore>,
}

impl AllocationEngine {
    pub fn new(store: Arc<BalanceStore>) -> Self {
        Self { store }
    }

    /// Create or edit a (line, modality) allocation's initial quantity.
    ///
    /// The edit is accepted only when the new quantity covers what the
    /// allocation has already consumed and the line's allocations, together
    /// with any consumption recorded directly on the line, still fit the
    /// contracted quantity. Direct consumption permanently claims line
    /// capacity; an allocation can only partition what is left. Consumed
    /// quantity is untouched; the line's own balance is unaffected (an
    /// allocation subdivides the contracted quantity, it is not a parallel
    /// balance).
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, contract_line_id = %input.contract_line_id, modality_id = %input.modality_id))]
    pub async fn set_modality_allocation(
        &self,
        input: SetAllocation,
    ) -> Result<ModalityAllocation, AppError> {
        if input.initial_quantity < Decimal::ZERO {
            ALLOCATION_EDITS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::InvalidQuantity(format!(
                "initial quantity must not be negative, got {}",
                input.initial_quantity
            )));
        }

        let line = self
            .store
            .line(input.tenant_id, input.contract_line_id)
            .ok_or(AppError::LineNotFound(input.contract_line_id))?;

        let lock = self
            .store
            .line_lock(input.tenant_id, input.contract_line_id);
        let _guard = lock.lock().await;

        let existing = self.store.find_allocation(
            input.tenant_id,
            input.contract_line_id,
            input.modality_id,
        );

        if let Some(current) = &existing {
            if input.initial_quantity < current.consumed_quantity {
                ALLOCATION_EDITS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(AppError::InvalidQuantity(format!(
                    "initial quantity {} is below the quantity already consumed {}",
                    input.initial_quantity, current.consumed_quantity
                )));
            }
        }

        // Quantity consumed directly on the line (before its first
        // allocation existed) stays claimed; allocations partition only the
        // remainder.
        let direct = self
            .store
            .direct_consumed(input.tenant_id, input.contract_line_id);
        let attempted = self.store.allocated_total(
            input.tenant_id,
            input.contract_line_id,
            existing.as_ref().map(|a| a.allocation_id),
            input.initial_quantity,
        ) + direct;
        if attempted > line.contracted_quantity {
            ALLOCATION_EDITS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(AppError::AllocationExceedsContract {
                contracted: line.contracted_quantity,
                attempted,
            });
        }

        let allocation = match existing {
            Some(current) => ModalityAllocation {
                modality_name: input.modality_name,
                financial_code: input.financial_code,
                initial_quantity: input.initial_quantity,
                ..current
            },
            None => ModalityAllocation {
                allocation_id: Uuid::new_v4(),
                tenant_id: input.tenant_id,
                contract_line_id: input.contract_line_id,
                modality_id: input.modality_id,
                modality_name: input.modality_name,
                financial_code: input.financial_code,
                initial_quantity: input.initial_quantity,
                consumed_quantity: Decimal::ZERO,
                created_utc: Utc::now(),
            },
        };
        self.store.put_allocation(allocation.clone());

        ALLOCATION_EDITS_TOTAL.with_label_values(&["ok"]).inc();
        info!(
            allocation_id = %allocation.allocation_id,
            initial_quantity = %allocation.initial_quantity,
            claimed_total = %attempted,
            contracted_quantity = %line.contracted_quantity,
            "Modality allocation set"
        );

        Ok(allocation)
    }

    /// Resolve the allocation for a (line, modality) pair, if one exists.
    /// Absence is a valid displayable state, distinct from an explicit zero.
    pub fn allocation_for(
        &self,
        tenant_id: Uuid,
        contract_line_id: Uuid,
        modality_id: Uuid,
    ) -> Option<ModalityAllocation> {
        self.store
            .find_allocation(tenant_id, contract_line_id, modality_id)
    }
}
