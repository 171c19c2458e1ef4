//! Block and transaction lookups.

use axum::extract::State;
use axum::Json;

use chainrelay_core::{LedgerError, RelayError};

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::resolve_chain;
use crate::api::types::{ApiResponse, BlockQuery, BlockSelector, BlockView, TransactionQuery, TransactionView};
use crate::app::AppState;

pub(crate) async fn block_info(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<BlockQuery>,
) -> Result<Json<ApiResponse<BlockView>>, ApiError> {
    let selector: BlockSelector = q.block_number.parse()?;
    let resolved = resolve_chain(&state, &q.chain_name)?;
    let channel_id = resolved.channel(q.channel_id)?;
    let client = state.bridge.client(&resolved.source).await?;

    let number = match selector {
        BlockSelector::Number(n) => n,
        BlockSelector::Latest => {
            let height = client.ledger_height(&channel_id).await.map_err(RelayError::from)?;
            height.checked_sub(1).ok_or_else(|| {
                RelayError::from(LedgerError::BlockNotFound { channel: channel_id.clone(), number: 0 })
            })?
        }
    };

    let block = client.block(&channel_id, number).await.map_err(RelayError::from)?;
    Ok(Json(ApiResponse::ok(BlockView::from_block(&block, q.only_header)?)))
}

pub(crate) async fn transaction_info(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<TransactionQuery>,
) -> Result<Json<ApiResponse<TransactionView>>, ApiError> {
    let resolved = resolve_chain(&state, &q.chain_name)?;
    let channel_id = resolved.channel(q.channel_id)?;
    let client = state.bridge.client(&resolved.source).await?;
    let info = client.transaction(&channel_id, &q.tx_id).await.map_err(RelayError::from)?;
    Ok(Json(ApiResponse::ok(TransactionView::from_info(&info)?)))
}
