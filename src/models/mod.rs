//! Domain models for balance-service.

mod allocation;
mod billing;
mod contract;
mod event;
pub mod status;

pub use allocation::{ModalityAllocation, ModalityBalanceView, SetAllocation};
pub use billing::{Bill, BillingSplit, BillingSplitDraft, SplitOutcome};
pub use contract::{BalanceSnapshot, ContractLine, LineBalanceView, RegisterContractLine};
pub use event::{ConsumptionEvent, ConsumptionTarget, HistoryEntry, RecordConsumption};
pub use status::{classify, classify_with_threshold, BalanceStatus};
