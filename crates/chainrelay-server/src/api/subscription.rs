//! Subscribe, unsubscribe and list.

use axum::extract::State;
use axum::Json;

use chainrelay_core::{RelayError, SubscribeRequest, SubscriptionBridge, SubscriptionInfo, SubscriptionKey};

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiResponse, SubscribeBody, SubscribeResult, UnsubscribeBody};
use crate::api::resolve_source;
use crate::app::AppState;

pub(crate) async fn subscribe(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SubscribeBody>,
) -> Result<Json<ApiResponse<SubscribeResult>>, ApiError> {
    let resolved = resolve_source(&state, &body.source)?;
    let channel_id = resolved.channel(body.channel_id)?;
    let outcome = state
        .bridge
        .subscribe(SubscribeRequest {
            source: resolved.source,
            channel_id,
            chaincode_id: body.chaincode_id,
            event_name: body.event_name,
            from_block: body.from_block,
            path: body.path,
        })
        .await?;

    Ok(Json(ApiResponse::ok(SubscribeResult {
        subscribe_id: outcome.key.token(),
        replayed: outcome.replay.events_forwarded,
        next_block: body.from_block.map(|_| outcome.replay.next_height),
    })))
}

pub(crate) async fn unsubscribe(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UnsubscribeBody>,
) -> Result<Json<ApiResponse<SubscriptionInfo>>, ApiError> {
    let key = unsubscribe_key(&state, body)?;
    let info = state.bridge.unsubscribe(&key).await?;
    Ok(Json(ApiResponse::ok(info)))
}

fn unsubscribe_key(state: &AppState, body: UnsubscribeBody) -> Result<SubscriptionKey, RelayError> {
    if let Some(token) = body.subscribe_id.filter(|t| !t.is_empty()) {
        return token.parse();
    }
    let resolved = resolve_source(state, &body.source)?;
    let channel_id = resolved.channel(body.channel_id)?;
    let (Some(chaincode_id), Some(event_name)) = (body.chaincode_id, body.event_name) else {
        return Err(RelayError::InvalidRequest(
            "subscribeId, or chaincodeId and eventName, are required".into(),
        ));
    };
    Ok(SubscriptionBridge::key_for(&resolved.source, &channel_id, &chaincode_id, &event_name))
}

pub(crate) async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<SubscriptionInfo>>> {
    Json(ApiResponse::ok(state.bridge.list()))
}
