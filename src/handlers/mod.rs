//! HTTP surface for the UI/reporting layer.

pub mod allocations;
pub mod balances;
pub mod billing;
pub mod consumption;
pub mod contract_lines;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

use crate::services::{
    get_metrics, AllocationEngine, BalanceStore, BillingSplitter, ConsumptionLedger,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BalanceStore>,
    pub allocations: AllocationEngine,
    pub ledger: ConsumptionLedger,
    pub billing: BillingSplitter,
}

impl AppState {
    pub fn new(store: Arc<BalanceStore>) -> Self {
        let ledger = ConsumptionLedger::new(store.clone());
        Self {
            allocations: AllocationEngine::new(store.clone()),
            billing: BillingSplitter::new(store.clone(), ledger.clone()),
            ledger,
            store,
        }
    }
}

/// Health check endpoint for liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "balance-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint.
async fn readiness_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/contract-lines", put(contract_lines::register_line))
        .route("/balances", get(balances::list_balances))
        .route("/balances/modalities", get(balances::list_modality_balances))
        .route("/allocations", put(allocations::set_allocation))
        .route(
            "/consumptions",
            post(consumption::record_consumption).get(consumption::consumption_history),
        )
        .route(
            "/consumptions/:event_id/reverse",
            post(consumption::reverse_consumption),
        )
        .route("/billing/split", post(billing::split_preview))
        .route("/billing/bills", post(billing::register_bill))
        .route("/billing/splits/:split_id/confirm", post(billing::confirm_split))
        .route("/billing/splits/:split_id/reverse", post(billing::reverse_split))
        .route(
            "/billing/bills/:bill_id/modalities/:modality_id",
            delete(billing::remove_modality_splits),
        )
        .with_state(state)
}
