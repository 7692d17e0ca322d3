//! Core services: balance store, allocation engine, consumption ledger,
//! billing splitter, metrics.

mod allocation;
mod billing;
mod ledger;
pub mod metrics;
mod store;

pub use allocation::AllocationEngine;
pub use billing::BillingSplitter;
pub use ledger::ConsumptionLedger;
pub use metrics::{get_metrics, init_metrics};
pub use store::BalanceStore;
