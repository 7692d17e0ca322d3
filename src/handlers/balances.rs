//! Balance listing handlers (reporting path).

use axum::extract::{Json, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{BalanceStatus, LineBalanceView, ModalityBalanceView};

fn default_page_size() -> i32 {
    50
}

/// Common listing parameters for both balance views.
#[derive(Debug, Deserialize)]
pub struct ListBalancesParams {
    pub tenant_id: Uuid,
    /// Case-insensitive product-name substring.
    pub product: Option<String>,
    /// AVAILABLE | LOW | DEPLETED.
    pub status: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<BalanceStatus>, AppError> {
    raw.map(|value| {
        BalanceStatus::parse(value).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("unknown status filter '{}'", value))
        })
    })
    .transpose()
}

/// List contract-line balances.
///
/// GET /balances
pub async fn list_balances(
    State(state): State<AppState>,
    Query(params): Query<ListBalancesParams>,
) -> Result<Json<Vec<LineBalanceView>>, AppError> {
    let status = parse_status(params.status.as_deref())?;
    Ok(Json(state.store.list_balances(
        params.tenant_id,
        params.product.as_deref(),
        status,
        params.page_size,
        params.page_token,
    )))
}

/// List balances at (line, modality) granularity.
///
/// GET /balances/modalities
pub async fn list_modality_balances(
    State(state): State<AppState>,
    Query(params): Query<ListBalancesParams>,
) -> Result<Json<Vec<ModalityBalanceView>>, AppError> {
    let status = parse_status(params.status.as_deref())?;
    Ok(Json(state.store.list_modality_balances(
        params.tenant_id,
        params.product.as_deref(),
        status,
        params.page_size,
        params.page_token,
    )))
}
