//! Common test utilities for balance-service integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use tower::util::ServiceExt;
use uuid::Uuid;

use balance_service::handlers::{build_router, AppState};
use balance_service::models::{
    BalanceSnapshot, ConsumptionEvent, ConsumptionTarget, ContractLine, ModalityAllocation,
    RecordConsumption, RegisterContractLine, SetAllocation,
};
use balance_service::services::BalanceStore;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,balance_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Fresh application state over an empty store, with a unique tenant id.
pub fn spawn_state() -> (AppState, Uuid) {
    init_tracing();
    let store = Arc::new(BalanceStore::new());
    (AppState::new(store), Uuid::new_v4())
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("invalid decimal literal")
}

pub fn line_target(contract_line_id: Uuid) -> ConsumptionTarget {
    ConsumptionTarget::Line { contract_line_id }
}

pub fn allocation_target(allocation_id: Uuid) -> ConsumptionTarget {
    ConsumptionTarget::Allocation { allocation_id }
}

/// Register a contract line with a fresh product id.
pub async fn register_test_line(
    state: &AppState,
    tenant_id: Uuid,
    product_name: &str,
    contracted: &str,
    unit_price: &str,
) -> ContractLine {
    register_line_for_product(
        state,
        tenant_id,
        Uuid::new_v4(),
        product_name,
        contracted,
        unit_price,
    )
    .await
}

/// Register a contract line supplying a specific product.
pub async fn register_line_for_product(
    state: &AppState,
    tenant_id: Uuid,
    product_id: Uuid,
    product_name: &str,
    contracted: &str,
    unit_price: &str,
) -> ContractLine {
    state
        .store
        .register_line(RegisterContractLine {
            contract_line_id: Uuid::new_v4(),
            tenant_id,
            contract_id: Uuid::new_v4(),
            contract_number: "CT-2024-0042".to_string(),
            supplier_id: Uuid::new_v4(),
            supplier_name: "Cooperativa Vale Verde".to_string(),
            product_id,
            product_name: product_name.to_string(),
            unit: "kg".to_string(),
            unit_price: dec(unit_price),
            contracted_quantity: dec(contracted),
        })
        .await
        .expect("Failed to register contract line")
}

/// Create or edit a modality allocation.
pub async fn set_test_allocation(
    state: &AppState,
    tenant_id: Uuid,
    contract_line_id: Uuid,
    modality_name: &str,
    initial: &str,
) -> ModalityAllocation {
    state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id,
            modality_id: Uuid::new_v4(),
            modality_name: modality_name.to_string(),
            financial_code: None,
            initial_quantity: dec(initial),
        })
        .await
        .expect("Failed to set allocation")
}

/// Record a consumption that is expected to succeed.
pub async fn consume(
    state: &AppState,
    tenant_id: Uuid,
    target: ConsumptionTarget,
    quantity: &str,
) -> (ConsumptionEvent, BalanceSnapshot) {
    state
        .ledger
        .record_consumption(RecordConsumption {
            tenant_id,
            target,
            quantity: dec(quantity),
            responsible: "nutricionista.ana".to_string(),
            note: None,
        })
        .await
        .expect("Failed to record consumption")
}

/// Build the router for HTTP-level tests.
pub fn test_router(state: AppState) -> Router {
    build_router(state)
}

/// Send a JSON request through the router and decode the JSON response.
pub async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Response was not JSON")
    };
    (status, value)
}
