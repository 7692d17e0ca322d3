//! Contract line registration (upstream sync).

use axum::{
    extract::{Json, State},
    http::StatusCode,
};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::{ContractLine, RegisterContractLine};

/// Register or re-sync a contract line from the upstream contract
/// collaborator. Idempotent upsert; never touches consumption state.
///
/// PUT /contract-lines
pub async fn register_line(
    State(state): State<AppState>,
    Json(req): Json<RegisterContractLine>,
) -> Result<(StatusCode, Json<ContractLine>), AppError> {
    let line = state.store.register_line(req).await?;
    Ok((StatusCode::OK, Json(line)))
}
