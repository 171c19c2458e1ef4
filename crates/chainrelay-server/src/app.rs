//! Router assembly and shared handler state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use chainrelay_core::SubscriptionBridge;

use crate::api;
use crate::catalog::ChainCatalog;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<SubscriptionBridge>,
    pub catalog: Arc<ChainCatalog>,
}

impl AppState {
    pub fn new(bridge: Arc<SubscriptionBridge>, catalog: Arc<ChainCatalog>) -> Self {
        Self { bridge, catalog }
    }
}

pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/subscribe", post(api::subscription::subscribe))
        .route("/unsubscribe", post(api::subscription::unsubscribe))
        .route("/subscriptions", get(api::subscription::list))
        .route("/invoke", post(api::contract::invoke))
        .route("/query", post(api::contract::query))
        .route("/contract/list", get(api::contract::list))
        .route("/contract/info", get(api::contract::info))
        .route("/block/info", get(api::ledger::block_info))
        .route("/transaction/info", get(api::ledger::transaction_info))
        .route("/connect/test", get(api::connect::test));

    Router::new()
        .nest("/api/v1", v1)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}
