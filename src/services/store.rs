//! Balance store: the single shared mutable resource of the ledger.
//!
//! Records live in concurrent maps keyed by (tenant_id, record_id). Every
//! mutating operation serializes on the parent contract line's lock, which
//! makes read-validate-write sequences atomic per line; the allocation-sum
//! invariant and the derived line balance both span a whole line, so the
//! line is the locking granule. Reads for listing go lock-free and tolerate
//! snapshot staleness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::status::{classify_with_threshold, DEFAULT_LOW_THRESHOLD};
use crate::models::{
    BalanceSnapshot, Bill, BillingSplit, ConsumptionEvent, ConsumptionTarget, ContractLine,
    LineBalanceView, ModalityAllocation, ModalityBalanceView, RegisterContractLine,
};
use crate::services::metrics::STORE_OP_DURATION;

type Key = (Uuid, Uuid);

#[derive(Debug, Clone)]
struct LineState {
    line: ContractLine,
    /// Consumption posted directly on the line (events with a line target).
    /// The line's aggregate consumption is derived from this plus the sum
    /// of its allocations' consumed quantities; there is no second counter.
    direct_consumed: Decimal,
}

pub struct BalanceStore {
    low_threshold: Decimal,
    lines: DashMap<Key, LineState>,
    allocations: DashMap<Key, ModalityAllocation>,
    events: DashMap<Key, ConsumptionEvent>,
    bills: DashMap<Key, Bill>,
    splits: DashMap<Key, BillingSplit>,
    line_locks: DashMap<Key, Arc<Mutex<()>>>,
    sequence: AtomicU64,
}

impl Default for BalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_LOW_THRESHOLD)
    }

    pub fn with_threshold(low_threshold: Decimal) -> Self {
        Self {
            low_threshold,
            lines: DashMap::new(),
            allocations: DashMap::new(),
            events: DashMap::new(),
            bills: DashMap::new(),
            splits: DashMap::new(),
            line_locks: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn low_threshold(&self) -> Decimal {
        self.low_threshold
    }

    /// Writer lock for one contract line. Allocation-level writes take the
    /// parent line's lock as well.
    pub(crate) fn line_lock(&self, tenant_id: Uuid, contract_line_id: Uuid) -> Arc<Mutex<()>> {
        self.line_locks
            .entry((tenant_id, contract_line_id))
            .or_default()
            .value()
            .clone()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Contract lines
    // -------------------------------------------------------------------------

    /// Register or re-sync a contract line from the upstream contract
    /// collaborator. Consumption state is lazy: a freshly observed line has
    /// zero consumption, and a re-sync never touches it.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, contract_line_id = %input.contract_line_id))]
    pub async fn register_line(
        &self,
        input: RegisterContractLine,
    ) -> Result<ContractLine, AppError> {
        if input.contracted_quantity < Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!(
                "contracted quantity must not be negative, got {}",
                input.contracted_quantity
            )));
        }

        let key = (input.tenant_id, input.contract_line_id);
        let lock = self.line_lock(input.tenant_id, input.contract_line_id);
        let _guard = lock.lock().await;

        let consumed = self.aggregate_consumed(input.tenant_id, input.contract_line_id);
        if input.contracted_quantity < consumed {
            return Err(AppError::InvalidQuantity(format!(
                "contracted quantity {} is below the quantity already consumed {}",
                input.contracted_quantity, consumed
            )));
        }

        // Claimed capacity is the allocations' full initial quantities plus
        // direct consumption; allocation-level consumption up to those
        // initials is already admitted, so a re-sync below this would let
        // the aggregate overrun the contract.
        let claimed = self.allocated_total(input.tenant_id, input.contract_line_id, None, Decimal::ZERO)
            + self.direct_consumed(input.tenant_id, input.contract_line_id);
        if input.contracted_quantity < claimed {
            return Err(AppError::AllocationExceedsContract {
                contracted: input.contracted_quantity,
                attempted: claimed,
            });
        }

        let line = ContractLine {
            contract_line_id: input.contract_line_id,
            tenant_id: input.tenant_id,
            contract_id: input.contract_id,
            contract_number: input.contract_number,
            supplier_id: input.supplier_id,
            supplier_name: input.supplier_name,
            product_id: input.product_id,
            product_name: input.product_name,
            unit: input.unit,
            unit_price: input.unit_price,
            contracted_quantity: input.contracted_quantity,
            created_utc: chrono::Utc::now(),
        };

        match self.lines.get_mut(&key) {
            Some(mut state) => {
                let created = state.line.created_utc;
                state.line = ContractLine {
                    created_utc: created,
                    ..line.clone()
                };
            }
            None => {
                self.lines.insert(
                    key,
                    LineState {
                        line: line.clone(),
                        direct_consumed: Decimal::ZERO,
                    },
                );
            }
        }

        Ok(line)
    }

    pub fn line(&self, tenant_id: Uuid, contract_line_id: Uuid) -> Option<ContractLine> {
        self.lines
            .get(&(tenant_id, contract_line_id))
            .map(|s| s.value().line.clone())
    }

    pub(crate) fn direct_consumed(&self, tenant_id: Uuid, contract_line_id: Uuid) -> Decimal {
        self.lines
            .get(&(tenant_id, contract_line_id))
            .map(|s| s.value().direct_consumed)
            .unwrap_or(Decimal::ZERO)
    }

    /// Apply a signed delta to a line's direct consumption.
    /// Caller holds the line lock.
    pub(crate) fn add_line_consumed(&self, tenant_id: Uuid, contract_line_id: Uuid, delta: Decimal) {
        if let Some(mut state) = self.lines.get_mut(&(tenant_id, contract_line_id)) {
            state.direct_consumed += delta;
        }
    }

    /// Lines supplying a given product, ascending line id (the documented
    /// tie-break for split candidate order).
    pub fn lines_for_product(&self, tenant_id: Uuid, product_id: Uuid) -> Vec<ContractLine> {
        let mut lines: Vec<ContractLine> = self
            .lines
            .iter()
            .filter(|e| e.key().0 == tenant_id && e.line.product_id == product_id)
            .map(|e| e.value().line.clone())
            .collect();
        lines.sort_by_key(|l| l.contract_line_id);
        lines
    }

    /// Aggregate consumed quantity for a line: direct consumption plus the
    /// sum of its allocations' consumption. Derived, never stored.
    pub fn aggregate_consumed(&self, tenant_id: Uuid, contract_line_id: Uuid) -> Decimal {
        let direct = self.direct_consumed(tenant_id, contract_line_id);
        let via_allocations: Decimal = self
            .allocations
            .iter()
            .filter(|e| e.key().0 == tenant_id && e.contract_line_id == contract_line_id)
            .map(|e| e.consumed_quantity)
            .sum();
        direct + via_allocations
    }

    pub fn line_snapshot(
        &self,
        tenant_id: Uuid,
        contract_line_id: Uuid,
    ) -> Option<BalanceSnapshot> {
        let line = self.line(tenant_id, contract_line_id)?;
        let consumed = self.aggregate_consumed(tenant_id, contract_line_id);
        Some(self.snapshot(line.contracted_quantity, consumed))
    }

    pub fn allocation_snapshot(
        &self,
        tenant_id: Uuid,
        allocation_id: Uuid,
    ) -> Option<BalanceSnapshot> {
        let allocation = self.allocation(tenant_id, allocation_id)?;
        Some(self.snapshot(allocation.initial_quantity, allocation.consumed_quantity))
    }

    fn snapshot(&self, capacity: Decimal, consumed: Decimal) -> BalanceSnapshot {
        BalanceSnapshot {
            capacity,
            consumed_quantity: consumed,
            available_quantity: capacity - consumed,
            status: classify_with_threshold(capacity, consumed, self.low_threshold),
        }
    }

    // -------------------------------------------------------------------------
    // Modality allocations
    // -------------------------------------------------------------------------

    pub fn allocation(&self, tenant_id: Uuid, allocation_id: Uuid) -> Option<ModalityAllocation> {
        self.allocations
            .get(&(tenant_id, allocation_id))
            .map(|a| a.value().clone())
    }

    pub fn find_allocation(
        &self,
        tenant_id: Uuid,
        contract_line_id: Uuid,
        modality_id: Uuid,
    ) -> Option<ModalityAllocation> {
        self.allocations
            .iter()
            .find(|e| {
                e.key().0 == tenant_id
                    && e.contract_line_id == contract_line_id
                    && e.modality_id == modality_id
            })
            .map(|e| e.value().clone())
    }

    /// Allocations of one line in modality priority order:
    /// ascending creation time, allocation id as tie-break.
    pub fn allocations_for_line(
        &self,
        tenant_id: Uuid,
        contract_line_id: Uuid,
    ) -> Vec<ModalityAllocation> {
        let mut allocations: Vec<ModalityAllocation> = self
            .allocations
            .iter()
            .filter(|e| e.key().0 == tenant_id && e.contract_line_id == contract_line_id)
            .map(|e| e.value().clone())
            .collect();
        allocations.sort_by_key(|a| (a.created_utc, a.allocation_id));
        allocations
    }

    /// Sum of initial quantities over a line's allocations, substituting
    /// `candidate` for the allocation named by `replace` (if any).
    /// This is the quantity the allocation invariant compares against the
    /// contracted quantity. Caller holds the line lock when validating.
    pub(crate) fn allocated_total(
        &self,
        tenant_id: Uuid,
        contract_line_id: Uuid,
        replace: Option<Uuid>,
        candidate: Decimal,
    ) -> Decimal {
        let others: Decimal = self
            .allocations
            .iter()
            .filter(|e| {
                e.key().0 == tenant_id
                    && e.contract_line_id == contract_line_id
                    && Some(e.allocation_id) != replace
            })
            .map(|e| e.initial_quantity)
            .sum();
        others + candidate
    }

    /// Caller holds the line lock.
    pub(crate) fn put_allocation(&self, allocation: ModalityAllocation) {
        self.allocations
            .insert((allocation.tenant_id, allocation.allocation_id), allocation);
    }

    /// Apply a signed delta to an allocation's consumption.
    /// Caller holds the parent line's lock.
    pub(crate) fn add_allocation_consumed(
        &self,
        tenant_id: Uuid,
        allocation_id: Uuid,
        delta: Decimal,
    ) {
        if let Some(mut allocation) = self.allocations.get_mut(&(tenant_id, allocation_id)) {
            allocation.consumed_quantity += delta;
        }
    }

    // -------------------------------------------------------------------------
    // Consumption events
    // -------------------------------------------------------------------------

    pub fn event(&self, tenant_id: Uuid, event_id: Uuid) -> Option<ConsumptionEvent> {
        self.events.get(&(tenant_id, event_id)).map(|e| e.value().clone())
    }

    /// Caller holds the target's line lock.
    pub(crate) fn insert_event(&self, event: ConsumptionEvent) {
        self.events.insert((event.tenant_id, event.event_id), event);
    }

    /// Caller holds the target's line lock.
    pub(crate) fn set_event_reversed(&self, tenant_id: Uuid, event_id: Uuid) {
        if let Some(mut event) = self.events.get_mut(&(tenant_id, event_id)) {
            event.reversed = true;
        }
    }

    /// All events for one target, newest first.
    pub fn events_for_target(
        &self,
        tenant_id: Uuid,
        target: ConsumptionTarget,
    ) -> Vec<ConsumptionEvent> {
        let mut events: Vec<ConsumptionEvent> = self
            .events
            .iter()
            .filter(|e| e.key().0 == tenant_id && e.target == target)
            .map(|e| e.value().clone())
            .collect();
        events.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        events
    }

    // -------------------------------------------------------------------------
    // Balance listings (reporting path, lock-free)
    // -------------------------------------------------------------------------

    /// List line balances for a tenant, ordered by line id ascending,
    /// cursor-paged. Filters apply before pagination.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn list_balances(
        &self,
        tenant_id: Uuid,
        product_filter: Option<&str>,
        status_filter: Option<crate::models::BalanceStatus>,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Vec<LineBalanceView> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_balances"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as usize;
        let needle = product_filter.map(|p| p.to_lowercase());

        let mut lines: Vec<ContractLine> = self
            .lines
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| e.value().line.clone())
            .collect();
        lines.sort_by_key(|l| l.contract_line_id);

        let views = lines
            .into_iter()
            .filter(|line| match &needle {
                Some(n) => line.product_name.to_lowercase().contains(n),
                None => true,
            })
            .map(|line| {
                let consumed = self.aggregate_consumed(tenant_id, line.contract_line_id);
                let snapshot = self.snapshot(line.contracted_quantity, consumed);
                LineBalanceView {
                    contract_line_id: line.contract_line_id,
                    contract_id: line.contract_id,
                    contract_number: line.contract_number,
                    supplier_name: line.supplier_name,
                    product_id: line.product_id,
                    product_name: line.product_name,
                    unit: line.unit,
                    unit_price: line.unit_price,
                    contracted_quantity: line.contracted_quantity,
                    consumed_quantity: snapshot.consumed_quantity,
                    available_quantity: snapshot.available_quantity,
                    status: snapshot.status,
                }
            })
            .filter(|view| status_filter.map_or(true, |s| view.status == s))
            .skip_while(|view| match page_token {
                Some(cursor) => view.contract_line_id <= cursor,
                None => false,
            })
            .take(limit)
            .collect();

        timer.observe_duration();
        views
    }

    /// List modality balances for a tenant at (line, modality) granularity,
    /// ordered by allocation id ascending, cursor-paged.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn list_modality_balances(
        &self,
        tenant_id: Uuid,
        product_filter: Option<&str>,
        status_filter: Option<crate::models::BalanceStatus>,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Vec<ModalityBalanceView> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_modality_balances"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as usize;
        let needle = product_filter.map(|p| p.to_lowercase());

        let mut allocations: Vec<ModalityAllocation> = self
            .allocations
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| e.value().clone())
            .collect();
        allocations.sort_by_key(|a| a.allocation_id);

        let views = allocations
            .into_iter()
            .filter_map(|allocation| {
                let line = self.line(tenant_id, allocation.contract_line_id)?;
                if let Some(n) = &needle {
                    if !line.product_name.to_lowercase().contains(n) {
                        return None;
                    }
                }
                let snapshot =
                    self.snapshot(allocation.initial_quantity, allocation.consumed_quantity);
                Some(ModalityBalanceView {
                    allocation_id: allocation.allocation_id,
                    contract_line_id: allocation.contract_line_id,
                    product_name: line.product_name,
                    modality_id: allocation.modality_id,
                    modality_name: allocation.modality_name,
                    financial_code: allocation.financial_code,
                    initial_quantity: allocation.initial_quantity,
                    consumed_quantity: snapshot.consumed_quantity,
                    available_quantity: snapshot.available_quantity,
                    status: snapshot.status,
                })
            })
            .filter(|view| status_filter.map_or(true, |s| view.status == s))
            .skip_while(|view| match page_token {
                Some(cursor) => view.allocation_id <= cursor,
                None => false,
            })
            .take(limit)
            .collect();

        timer.observe_duration();
        views
    }

    // -------------------------------------------------------------------------
    // Bills and splits
    // -------------------------------------------------------------------------

    pub fn bill(&self, tenant_id: Uuid, bill_id: Uuid) -> Option<Bill> {
        self.bills.get(&(tenant_id, bill_id)).map(|b| b.value().clone())
    }

    pub(crate) fn insert_bill(&self, bill: Bill) {
        self.bills.insert((bill.tenant_id, bill.bill_id), bill);
    }

    pub(crate) fn set_bill_total(&self, tenant_id: Uuid, bill_id: Uuid, total: Decimal) {
        if let Some(mut bill) = self.bills.get_mut(&(tenant_id, bill_id)) {
            bill.total_amount = total;
        }
    }

    pub fn split(&self, tenant_id: Uuid, split_id: Uuid) -> Option<BillingSplit> {
        self.splits.get(&(tenant_id, split_id)).map(|s| s.value().clone())
    }

    pub(crate) fn insert_split(&self, split: BillingSplit) {
        self.splits.insert((split.tenant_id, split.split_id), split);
    }

    /// Replace a stored split wholesale (confirmation state transitions).
    pub(crate) fn update_split(&self, split: BillingSplit) {
        self.splits.insert((split.tenant_id, split.split_id), split);
    }

    pub(crate) fn remove_split(&self, tenant_id: Uuid, split_id: Uuid) -> Option<BillingSplit> {
        self.splits.remove(&(tenant_id, split_id)).map(|(_, s)| s)
    }

    /// Splits of one bill in creation order.
    pub fn splits_for_bill(&self, tenant_id: Uuid, bill_id: Uuid) -> Vec<BillingSplit> {
        let mut splits: Vec<BillingSplit> = self
            .splits
            .iter()
            .filter(|e| e.key().0 == tenant_id && e.bill_id == bill_id)
            .map(|e| e.value().clone())
            .collect();
        splits.sort_by_key(|s| (s.created_utc, s.split_id));
        splits
    }
}
