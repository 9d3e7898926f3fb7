//! REST API router for the matching engine.
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::warn;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::MatchingEngine;
use crate::error::LedgerError;
use crate::execution::MatchingResult;
use crate::ledger::CancelReceipt;
use crate::memory::{InMemoryLedger, NewOrder};
use crate::persistence::{FilePersistence, PersistedState};
use crate::types::{Order, OrderId, TradingPairId, UserId};

/// Shared app state: the reference ledger and an engine over it.
#[derive(Clone)]
pub struct AppState {
    pub(crate) ledger: Arc<InMemoryLedger>,
    pub(crate) engine: MatchingEngine,
    pub(crate) persistence: Option<FilePersistence>,
}

impl AppState {
    pub fn new(ledger: Arc<InMemoryLedger>, engine: MatchingEngine) -> Self {
        Self {
            ledger,
            engine,
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, persistence: FilePersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Writes the ledger to the state file, if one is configured.
    pub fn persist(&self) {
        if let Some(p) = &self.persistence {
            if let Err(e) = p.save(&PersistedState::capture(&self.ledger)) {
                warn!("failed to persist ledger path={} error={}", p.path().display(), e);
            }
        }
    }
}

/// Builds the REST router with state. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(place_order))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/pairs/:pair_id/match", post(match_pair))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn error_response(e: &LedgerError) -> Response {
    let status = match e {
        LedgerError::OrderNotFound(_) | LedgerError::PairNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::NotOwner { .. } => StatusCode::FORBIDDEN,
        LedgerError::NotOpen { .. } | LedgerError::InsufficientRemaining { .. } => StatusCode::CONFLICT,
        LedgerError::Transport(_) | LedgerError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    let message = if e.is_too_late() {
        "too late to cancel: order already filled".to_string()
    } else {
        e.to_string()
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn place_order(Extension(state): Extension<AppState>, Json(request): Json<NewOrder>) -> Response {
    let pair = request.trading_pair_id;
    let order = match state.ledger.place_order(request) {
        Ok(order) => order,
        Err(e) => return error_response(&e),
    };
    let matching_result = state.engine.match_orders(pair).await;
    state.persist();
    let out = PlaceOrderResponse {
        order_id: order.id,
        order: state.ledger.order(order.id),
        matching_result,
    };
    (StatusCode::OK, Json(out)).into_response()
}

async fn get_order(Extension(state): Extension<AppState>, Path(order_id): Path<u64>) -> Response {
    match state.ledger.order(OrderId(order_id)) {
        Some(order) => (StatusCode::OK, Json(order)).into_response(),
        None => error_response(&LedgerError::OrderNotFound(OrderId(order_id))),
    }
}

#[derive(Deserialize)]
struct CancelRequest {
    user_id: u64,
}

/// Body of `POST /orders`: the placed order as it stands after the pass.
#[derive(Serialize)]
struct PlaceOrderResponse {
    order_id: OrderId,
    order: Option<Order>,
    matching_result: MatchingResult,
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
    receipt: CancelReceipt,
}

async fn cancel_order(
    Extension(state): Extension<AppState>,
    Path(order_id): Path<u64>,
    Json(body): Json<CancelRequest>,
) -> Response {
    match state
        .engine
        .try_cancel_order(OrderId(order_id), UserId(body.user_id))
        .await
    {
        Ok(receipt) => {
            state.persist();
            (StatusCode::OK, Json(CancelResponse { cancelled: true, receipt })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn match_pair(Extension(state): Extension<AppState>, Path(pair_id): Path<u64>) -> Response {
    let result = state.engine.match_orders(TradingPairId(pair_id)).await;
    if !result.executed_trades.is_empty() {
        state.persist();
    }
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result)).into_response()
}
