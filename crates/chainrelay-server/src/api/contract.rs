//! Chaincode proposals and metadata.

use axum::extract::State;
use axum::Json;

use chainrelay_core::ContractInfo;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::types::{payload_value, ApiResponse, ChannelQuery, ContractQuery, ProposalBody, ProposalResult};
use crate::api::{resolve_chain, resolve_source};
use crate::app::AppState;

#[derive(Debug, Clone, Copy)]
enum Proposal {
    Invoke,
    Query,
}

async fn propose(
    state: &AppState,
    body: ProposalBody,
    kind: Proposal,
) -> Result<Json<ApiResponse<ProposalResult>>, ApiError> {
    let resolved = resolve_source(state, &body.source)?;
    let channel_id = resolved.channel(body.channel_id)?;
    let client = state.bridge.client(&resolved.source).await?;
    let bytes = match kind {
        Proposal::Invoke => client.invoke(&channel_id, &body.chaincode_id, &body.method, &body.args).await,
        Proposal::Query => client.query(&channel_id, &body.chaincode_id, &body.method, &body.args).await,
    }
    .map_err(chainrelay_core::RelayError::from)?;
    tracing::debug!(
        kind = ?kind,
        channel = %channel_id,
        chaincode = %body.chaincode_id,
        method = %body.method,
        "proposal done"
    );
    Ok(Json(ApiResponse::ok(ProposalResult { payload: payload_value(&bytes) })))
}

pub(crate) async fn invoke(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ProposalBody>,
) -> Result<Json<ApiResponse<ProposalResult>>, ApiError> {
    propose(&state, body, Proposal::Invoke).await
}

pub(crate) async fn query(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ProposalBody>,
) -> Result<Json<ApiResponse<ProposalResult>>, ApiError> {
    propose(&state, body, Proposal::Query).await
}

pub(crate) async fn list(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ChannelQuery>,
) -> Result<Json<ApiResponse<Vec<ContractInfo>>>, ApiError> {
    let resolved = resolve_chain(&state, &q.chain_name)?;
    let channel_id = resolved.channel(q.channel_id)?;
    let client = state.bridge.client(&resolved.source).await?;
    let contracts = client.contracts(&channel_id).await.map_err(chainrelay_core::RelayError::from)?;
    Ok(Json(ApiResponse::ok(contracts)))
}

pub(crate) async fn info(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ContractQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let resolved = resolve_chain(&state, &q.chain_name)?;
    let channel_id = resolved.channel(q.channel_id)?;
    let client = state.bridge.client(&resolved.source).await?;
    let metadata = client
        .contract_metadata(&channel_id, &q.chaincode_id)
        .await
        .map_err(chainrelay_core::RelayError::from)?;
    Ok(Json(ApiResponse::ok(metadata)))
}
