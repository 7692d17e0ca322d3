//! Allocation engine integration tests: the allocation-sum invariant and
//! edit preconditions.

mod common;

use common::{
    allocation_target, consume, dec, line_target, register_test_line, set_test_allocation,
    spawn_state,
};

use balance_service::error::AppError;
use balance_service::models::SetAllocation;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn allocations_within_contract_are_accepted() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Arroz Integral", "100", "5.20").await;

    let mod_a = set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "60").await;
    assert_eq!(mod_a.initial_quantity, dec("60"));
    assert_eq!(mod_a.consumed_quantity, Decimal::ZERO);

    // 60 + 40 lands exactly on the contracted quantity
    let mod_b = set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Infantil", "40").await;
    assert_eq!(mod_b.initial_quantity, dec("40"));
}

#[tokio::test]
async fn allocation_exceeding_contract_is_rejected_with_both_figures() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Arroz Integral", "100", "5.20").await;

    set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "60").await;

    let err = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: Uuid::new_v4(),
            modality_name: "PNAE Infantil".to_string(),
            financial_code: None,
            initial_quantity: dec("50"),
        })
        .await
        .expect_err("60 + 50 must not fit a 100-unit line");

    match err {
        AppError::AllocationExceedsContract {
            contracted,
            attempted,
        } => {
            assert_eq!(contracted, dec("100"));
            assert_eq!(attempted, dec("110"));
        }
        other => panic!("Expected AllocationExceedsContract, got {:?}", other),
    }

    // A smaller quantity for the same modality goes through
    let mod_b = set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Infantil", "40").await;
    assert_eq!(mod_b.initial_quantity, dec("40"));
}

#[tokio::test]
async fn editing_an_allocation_replaces_its_own_share_in_the_sum() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Feijão Preto", "100", "8.00").await;

    let first = set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "80").await;

    // Re-editing the same modality from 80 to 90 must not count the old 80
    let edited = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: first.modality_id,
            modality_name: first.modality_name.clone(),
            financial_code: None,
            initial_quantity: dec("90"),
        })
        .await
        .expect("Edit within the contracted quantity must pass");

    assert_eq!(edited.allocation_id, first.allocation_id);
    assert_eq!(edited.initial_quantity, dec("90"));
}

#[tokio::test]
async fn shrinking_below_consumed_is_rejected() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Feijão Preto", "100", "8.00").await;
    let allocation =
        set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "60").await;

    consume(&state, tenant_id, allocation_target(allocation.allocation_id), "30").await;

    let err = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: allocation.modality_id,
            modality_name: allocation.modality_name.clone(),
            financial_code: None,
            initial_quantity: dec("20"),
        })
        .await
        .expect_err("Cannot shrink initial quantity below consumed");
    assert!(matches!(err, AppError::InvalidQuantity(_)));

    // Shrinking to exactly the consumed quantity is allowed
    let edited = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: allocation.modality_id,
            modality_name: allocation.modality_name.clone(),
            financial_code: None,
            initial_quantity: dec("30"),
        })
        .await
        .expect("Edit down to the consumed quantity must pass");
    assert_eq!(edited.initial_quantity, dec("30"));
    assert_eq!(edited.available_quantity(), Decimal::ZERO);
}

#[tokio::test]
async fn editing_initial_quantity_never_touches_consumption() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Leite em Pó", "200", "22.50").await;
    let allocation =
        set_test_allocation(&state, tenant_id, line.contract_line_id, "Creche", "60").await;

    consume(&state, tenant_id, allocation_target(allocation.allocation_id), "10").await;

    let edited = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: allocation.modality_id,
            modality_name: allocation.modality_name.clone(),
            financial_code: Some("12.361.0401".to_string()),
            initial_quantity: dec("80"),
        })
        .await
        .expect("Edit must pass");

    assert_eq!(edited.consumed_quantity, dec("10"));
    assert_eq!(edited.available_quantity(), dec("70"));
    assert_eq!(edited.financial_code.as_deref(), Some("12.361.0401"));
}

#[tokio::test]
async fn negative_initial_quantity_is_rejected() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Leite em Pó", "200", "22.50").await;

    let err = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: Uuid::new_v4(),
            modality_name: "Creche".to_string(),
            financial_code: None,
            initial_quantity: dec("-1"),
        })
        .await
        .expect_err("Negative initial quantity must be rejected");
    assert!(matches!(err, AppError::InvalidQuantity(_)));
}

#[tokio::test]
async fn absent_allocation_is_distinct_from_explicit_zero() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Banana Prata", "50", "3.10").await;
    let modality_id = Uuid::new_v4();

    assert!(state
        .allocations
        .allocation_for(tenant_id, line.contract_line_id, modality_id)
        .is_none());

    state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id,
            modality_name: "EJA".to_string(),
            financial_code: None,
            initial_quantity: Decimal::ZERO,
        })
        .await
        .expect("Explicit zero allocation is a valid record");

    let stored = state
        .allocations
        .allocation_for(tenant_id, line.contract_line_id, modality_id)
        .expect("Explicit zero allocation must exist");
    assert_eq!(stored.initial_quantity, Decimal::ZERO);
}

#[tokio::test]
async fn unknown_line_is_rejected() {
    let (state, tenant_id) = spawn_state();
    let missing = Uuid::new_v4();

    let err = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: missing,
            modality_id: Uuid::new_v4(),
            modality_name: "EJA".to_string(),
            financial_code: None,
            initial_quantity: dec("10"),
        })
        .await
        .expect_err("Allocating on an unknown line must fail");
    assert!(matches!(err, AppError::LineNotFound(id) if id == missing));
}

#[tokio::test]
async fn direct_consumption_counts_against_the_allocatable_capacity() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Arroz Integral", "100", "5.20").await;

    // 50 consumed directly before any allocation exists stays claimed
    consume(&state, tenant_id, line_target(line.contract_line_id), "50").await;

    let err = state
        .allocations
        .set_modality_allocation(SetAllocation {
            tenant_id,
            contract_line_id: line.contract_line_id,
            modality_id: Uuid::new_v4(),
            modality_name: "PNAE Fundamental".to_string(),
            financial_code: None,
            initial_quantity: dec("100"),
        })
        .await
        .expect_err("Only 50 of the line is left to allocate");
    match err {
        AppError::AllocationExceedsContract {
            contracted,
            attempted,
        } => {
            assert_eq!(contracted, dec("100"));
            assert_eq!(attempted, dec("150"));
        }
        other => panic!("Expected AllocationExceedsContract, got {:?}", other),
    }

    // The remaining 50 allocates and can be consumed in full, landing the
    // line exactly on its contracted quantity
    let allocation =
        set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "50")
            .await;
    consume(&state, tenant_id, allocation_target(allocation.allocation_id), "50").await;

    let snapshot = state
        .store
        .line_snapshot(tenant_id, line.contract_line_id)
        .unwrap();
    assert_eq!(snapshot.consumed_quantity, dec("100"));
    assert_eq!(snapshot.available_quantity, Decimal::ZERO);

    let err = state
        .ledger
        .record_consumption(balance_service::models::RecordConsumption {
            tenant_id,
            target: allocation_target(allocation.allocation_id),
            quantity: dec("1"),
            responsible: "nutricionista.ana".to_string(),
            note: None,
        })
        .await
        .expect_err("The line is exhausted");
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
}

#[tokio::test]
async fn shrinking_a_resynced_line_below_the_claimed_capacity_is_rejected() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Feijão Preto", "100", "8.00").await;
    consume(&state, tenant_id, line_target(line.contract_line_id), "50").await;
    set_test_allocation(&state, tenant_id, line.contract_line_id, "PNAE Fundamental", "50").await;

    // Nothing of the allocation is consumed yet, but the re-sync must
    // hold the full claim: 50 direct + 50 allocated
    let err = state
        .store
        .register_line(balance_service::models::RegisterContractLine {
            contract_line_id: line.contract_line_id,
            tenant_id,
            contract_id: line.contract_id,
            contract_number: line.contract_number.clone(),
            supplier_id: line.supplier_id,
            supplier_name: line.supplier_name.clone(),
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            unit: line.unit.clone(),
            unit_price: line.unit_price,
            contracted_quantity: dec("60"),
        })
        .await
        .expect_err("60 cannot hold a 100-unit claim");
    match err {
        AppError::AllocationExceedsContract {
            contracted,
            attempted,
        } => {
            assert_eq!(contracted, dec("60"));
            assert_eq!(attempted, dec("100"));
        }
        other => panic!("Expected AllocationExceedsContract, got {:?}", other),
    }
}

#[tokio::test]
async fn accepted_edits_keep_the_sum_invariant() {
    let (state, tenant_id) = spawn_state();
    let line = register_test_line(&state, tenant_id, "Carne Bovina", "500", "31.90").await;

    let quantities = ["120", "200", "80", "100"];
    for (i, quantity) in quantities.iter().enumerate() {
        set_test_allocation(
            &state,
            tenant_id,
            line.contract_line_id,
            &format!("Modalidade {}", i + 1),
            quantity,
        )
        .await;
    }

    let total: Decimal = state
        .store
        .allocations_for_line(tenant_id, line.contract_line_id)
        .iter()
        .map(|a| a.initial_quantity)
        .sum();
    assert!(total <= line.contracted_quantity);
    assert_eq!(total, dec("500"));
}
