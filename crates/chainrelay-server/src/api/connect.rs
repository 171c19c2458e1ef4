//! Connectivity check for a catalog chain.

use axum::extract::State;
use axum::Json;

use chainrelay_core::RelayError;

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::resolve_chain;
use crate::api::types::{ApiResponse, ChainQuery, ConnectResult};
use crate::app::AppState;

pub(crate) async fn test(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ChainQuery>,
) -> Result<Json<ApiResponse<ConnectResult>>, ApiError> {
    let resolved = resolve_chain(&state, &q.chain_name)?;
    let client = state.bridge.client(&resolved.source).await?;
    let channels = client.channels().await.map_err(RelayError::from)?;
    Ok(Json(ApiResponse::ok(ConnectResult {
        chain_name: q.chain_name,
        network_id: client.network_id().to_string(),
        channels,
    })))
}
