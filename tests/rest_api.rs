//! REST API integration tests. Spawn the server and call endpoints with reqwest.

use pair_matching_engine::api::{self, AppState};
use pair_matching_engine::{FeeStructure, InMemoryLedger, MatchingEngine, TradingPair, TradingPairId, UserId};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_app() -> (SocketAddr, Arc<InMemoryLedger>, tokio::task::JoinHandle<()>) {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .add_pair(TradingPair {
            id: TradingPairId(1),
            symbol: "BTC-USD".into(),
            base_asset: "BTC".into(),
            quote_asset: "USD".into(),
            fees: FeeStructure::new(Decimal::new(6, 3), Decimal::new(11, 3)),
        })
        .unwrap();
    for user in 1..=3 {
        ledger.deposit(UserId(user), "USD", Decimal::from(10_000)).unwrap();
        ledger.deposit(UserId(user), "BTC", Decimal::from(50)).unwrap();
    }
    let engine = MatchingEngine::new(ledger.clone());
    let app = api::create_router(AppState::new(ledger.clone(), engine));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (addr, ledger, handle)
}

fn limit(user: u64, side: &str, price: &str, amount: &str) -> Value {
    json!({
        "user_id": user,
        "trading_pair_id": 1,
        "side": side,
        "order_type": "limit",
        "price": price,
        "amount": amount
    })
}

async fn place(client: &reqwest::Client, addr: SocketAddr, body: &Value) -> Value {
    let response = client
        .post(format!("http://{}/orders", addr))
        .json(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn placing_crossing_orders_executes_a_trade() {
    let (addr, ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();

    let sell = place(&client, addr, &limit(2, "sell", "100", "1")).await;
    assert_eq!(sell["matching_result"]["success"], json!(true));
    assert!(sell["matching_result"]["executed_trades"].as_array().unwrap().is_empty());

    let buy = place(&client, addr, &limit(1, "buy", "100", "1")).await;
    let trades = buy["matching_result"]["executed_trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(buy["order"]["status"], json!("filled"));
    assert_eq!(ledger.trades().len(), 1);
    assert_eq!(ledger.fee_income("USD"), Decimal::new(17, 1));
}

#[tokio::test]
async fn get_order_returns_404_for_unknown_id() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let response = reqwest::get(format!("http://{}/orders/999", addr)).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn place_order_rejects_insufficient_funds() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/orders", addr))
        .json(&limit(1, "buy", "100000", "1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("available"));
}

#[tokio::test]
async fn cancel_maps_reasons_to_status_codes() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let resting = place(&client, addr, &limit(1, "buy", "90", "2")).await;
    let id = resting["order_id"].as_u64().unwrap();
    let cancel_url = format!("http://{}/orders/{}/cancel", addr, id);

    let wrong_user = client.post(&cancel_url).json(&json!({ "user_id": 2 })).send().await.unwrap();
    assert_eq!(wrong_user.status(), 403);

    let ok = client.post(&cancel_url).json(&json!({ "user_id": 1 })).send().await.unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["cancelled"], json!(true));

    let again = client.post(&cancel_url).json(&json!({ "user_id": 1 })).send().await.unwrap();
    assert_eq!(again.status(), 409);

    let missing = client
        .post(format!("http://{}/orders/999/cancel", addr))
        .json(&json!({ "user_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn cancelling_a_filled_order_is_too_late() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let sell = place(&client, addr, &limit(2, "sell", "100", "1")).await;
    place(&client, addr, &limit(1, "buy", "100", "1")).await;

    let response = client
        .post(format!("http://{}/orders/{}/cancel", addr, sell["order_id"]))
        .json(&json!({ "user_id": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("too late to cancel"));
}

#[tokio::test]
async fn match_endpoint_reports_unknown_pair() {
    let (addr, _ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();

    let ok = client.post(format!("http://{}/pairs/1/match", addr)).send().await.unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["success"], json!(true));

    let missing = client.post(format!("http://{}/pairs/77/match", addr)).send().await.unwrap();
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn place_order_refuses_a_price_too_large_to_value() {
    let (addr, ledger, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/orders", addr))
        .json(&limit(2, "sell", "79228162514264337593543950335", "2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(ledger.balance(UserId(2), "BTC").locked, Decimal::ZERO);
}
