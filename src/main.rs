//! HTTP server for the pair matching engine.
//!
//! Endpoints: health, place order (then match), run a match pass, cancel order, get order.
//! Backed by the in-memory reference ledger, optionally persisted to `STATE_FILE`.

use std::sync::Arc;

use log::{error, info, warn};
use pair_matching_engine::api::{self, AppState};
use pair_matching_engine::audit::StdoutAuditSink;
use pair_matching_engine::config::ServerConfig;
use pair_matching_engine::persistence::FilePersistence;
use pair_matching_engine::{FeeStructure, InMemoryLedger, MatchingEngine, TradingPair, TradingPairId};
use rust_decimal::Decimal;
use tokio::net::TcpListener;

fn demo_pair() -> TradingPair {
    TradingPair {
        id: TradingPairId(1),
        symbol: "BTC-USD".into(),
        base_asset: "BTC".into(),
        quote_asset: "USD".into(),
        fees: FeeStructure::new(Decimal::new(6, 3), Decimal::new(11, 3)),
    }
}

fn open_ledger(config: &ServerConfig) -> Result<InMemoryLedger, String> {
    if let Some(path) = &config.state_file {
        if let Some(ledger) = FilePersistence::new(path).load_ledger()? {
            info!("ledger restored from {}", path.display());
            return Ok(ledger);
        }
    }
    let ledger = InMemoryLedger::new();
    if config.seed_demo_pair {
        ledger.add_pair(demo_pair()).map_err(|e| e.to_string())?;
    }
    Ok(ledger)
}

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let config = ServerConfig::from_env();

    let ledger = match open_ledger(&config) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            error!("failed to open ledger: {}", e);
            std::process::exit(1);
        }
    };
    let engine = MatchingEngine::new(ledger.clone())
        .with_config(config.engine)
        .with_audit(Arc::new(StdoutAuditSink));

    let mut state = AppState::new(ledger.clone(), engine.clone());
    if let Some(path) = &config.state_file {
        state = state.with_persistence(FilePersistence::new(path));
    }

    if let Some(interval) = config.match_interval {
        let scheduled = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pairs: Vec<TradingPairId> = ledger.pairs().iter().map(|p| p.id).collect();
                let results = engine.match_pairs(&pairs).await;
                if results.iter().any(|(_, r)| !r.executed_trades.is_empty()) {
                    scheduled.persist();
                }
                for (pair, result) in results.iter().filter(|(_, r)| !r.success) {
                    warn!("scheduled pass failed pair={} errors={:?}", pair, result.errors);
                }
            }
        });
        info!("periodic matching every {:?}", interval);
    }

    let app = api::create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("bind {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("listening on http://{}", addr);
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("server error: {}", e);
    }
}
