//! HTTP surface for the peg controller: status, history, health, and
//! Prometheus metrics. 128-bit amounts are emitted as decimal strings
//! so JSON consumers never see lossy numbers; prices become decimal
//! floats for display only.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use unita_peg::PegController;
use unita_types::units::{PPM_SCALE, PRICE_SCALE};

const DEFAULT_HISTORY_COUNT: usize = 100;
const MAX_HISTORY_COUNT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PegController>,
}

pub async fn start_server(controller: Arc<PegController>, addr: SocketAddr) -> Result<()> {
    let state = AppState { controller };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/peg/status", get(peg_status))
        .route("/peg/history", get(peg_history))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .layer(cors)
        .with_state(state);

    info!("API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind API listener")?;
    axum::serve(listener, app)
        .await
        .context("API server terminated")?;
    Ok(())
}

async fn root() -> &'static str {
    "unita-chain API — UNA algorithmic peg node"
}

/// The `peg_getstatus` payload.
pub fn status_json(controller: &PegController) -> serde_json::Value {
    let state = controller.get_state();
    let config = controller.get_config();
    let healthy = controller.is_healthy();

    let mut config_json = serde_json::json!({
        "k": config.k_ppm as f64 / PPM_SCALE as f64,
        "deadband": config.deadband_ppm as f64 / PPM_SCALE as f64,
        "max_expansion": config.max_expansion_ppm as f64 / PPM_SCALE as f64,
        "max_contraction": config.max_contraction_ppm as f64 / PPM_SCALE as f64,
        "epoch_seconds": config.epoch_seconds,
        "oracle_max_age_seconds": config.oracle_max_age_seconds,
        "treasury_address": config.treasury_address,
    });
    if config.ki_ppm > 0 || config.kd_ppm > 0 {
        config_json["ki"] = serde_json::json!(config.ki_ppm as f64 / PPM_SCALE as f64);
        config_json["kd"] = serde_json::json!(config.kd_ppm as f64 / PPM_SCALE as f64);
        config_json["integral"] = serde_json::json!(state.integral.to_string());
    }

    serde_json::json!({
        "enabled": config.enabled,
        "healthy": healthy,
        "circuit_breaker": state.circuit_breaker_triggered,
        "epoch_id": state.epoch_id,
        "timestamp": state.timestamp,
        "block_height": state.block_height,
        "price_usd": state.last_price_scaled as f64 / PRICE_SCALE as f64,
        "supply": state.last_supply.to_string(),
        "last_delta": state.last_delta.to_string(),
        "last_action": state.last_action.as_str(),
        "last_reason": state.last_reason,
        "total_bond_debt": state.total_bond_debt.to_string(),
        "bonds_issued_this_epoch": state.bonds_issued_this_epoch.to_string(),
        "config": config_json,
    })
}

/// The `peg_gethistory` payload: events newest first.
pub fn history_json(controller: &PegController, count: usize) -> serde_json::Value {
    let count = count.clamp(1, MAX_HISTORY_COUNT);
    let events: Vec<serde_json::Value> = controller
        .get_recent_events(count)
        .iter()
        .map(|event| {
            serde_json::json!({
                "epoch_id": event.epoch_id,
                "timestamp": event.timestamp,
                "block_height": event.block_height,
                "price_usd": event.price_scaled as f64 / PRICE_SCALE as f64,
                "supply": event.supply.to_string(),
                "delta": event.delta.to_string(),
                "action": event.action.as_str(),
                "reason": event.reason,
            })
        })
        .collect();

    serde_json::json!({
        "count": events.len(),
        "events": events,
    })
}

async fn peg_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(status_json(&state.controller))
}

#[derive(serde::Deserialize)]
struct HistoryQuery {
    count: Option<usize>,
}

async fn peg_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let count = query.count.unwrap_or(DEFAULT_HISTORY_COUNT);
    Json(history_json(&state.controller, count))
}

async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let peg_state = state.controller.get_state();
    Json(serde_json::json!({
        "healthy": state.controller.is_healthy(),
        "enabled": state.controller.get_config().enabled,
        "circuit_breaker": peg_state.circuit_breaker_triggered,
        "epoch_id": peg_state.epoch_id,
        "last_action": peg_state.last_action.as_str(),
    }))
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    let peg_state = state.controller.get_state();
    let config = state.controller.get_config();

    fn saturate_i128(v: i128) -> i64 {
        i64::try_from(v).unwrap_or(if v > 0 { i64::MAX } else { i64::MIN })
    }

    let mut registry = Registry::default();

    let epoch_id = Gauge::<i64>::default();
    epoch_id.set(i64::try_from(peg_state.epoch_id).unwrap_or(i64::MAX));
    registry.register("unita_peg_epoch_id", "Last executed epoch id", epoch_id);

    let price_scaled = Gauge::<i64>::default();
    price_scaled.set(peg_state.last_price_scaled);
    registry.register(
        "unita_peg_price_scaled",
        "Latest oracle price (scaled 1e6)",
        price_scaled,
    );

    let supply = Gauge::<i64>::default();
    supply.set(saturate_i128(peg_state.last_supply));
    registry.register(
        "unita_peg_supply_units",
        "Circulating supply in smallest units (saturated)",
        supply,
    );

    let last_delta = Gauge::<i64>::default();
    last_delta.set(saturate_i128(peg_state.last_delta));
    registry.register(
        "unita_peg_last_delta_units",
        "Supply delta of the last epoch in smallest units (saturated)",
        last_delta,
    );

    let bond_debt = Gauge::<i64>::default();
    bond_debt.set(saturate_i128(peg_state.total_bond_debt));
    registry.register(
        "unita_peg_total_bond_debt_units",
        "Outstanding bond debt in smallest units (saturated)",
        bond_debt,
    );

    let circuit_breaker = Gauge::<i64>::default();
    circuit_breaker.set(peg_state.circuit_breaker_triggered as i64);
    registry.register(
        "unita_peg_circuit_breaker",
        "Circuit breaker latched (1/0)",
        circuit_breaker,
    );

    let enabled = Gauge::<i64>::default();
    enabled.set(config.enabled as i64);
    registry.register("unita_peg_enabled", "Peg enabled (1/0)", enabled);

    let mut out = String::new();
    if encode(&mut out, &registry).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    (headers, out).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use unita_ledger::{MemoryChain, UtxoLedger};
    use unita_oracle::FixedOracle;
    use unita_peg::PegConfig;
    use unita_storage::MemoryStore;
    use unita_types::units::COIN_SCALE;

    const TREASURY: &str = "una1treasury0dev0000000000000000";

    fn controller() -> Arc<PegController> {
        let chain = MemoryChain::with_genesis(TREASURY, 1_000 * COIN_SCALE);
        let ledger = Arc::new(UtxoLedger::new(
            Arc::new(chain.clone()),
            Arc::new(chain),
        ));
        let oracle = Arc::new(FixedOracle::new(1_050_000));
        let config = PegConfig {
            enabled: true,
            treasury_address: TREASURY.to_string(),
            ..Default::default()
        };
        Arc::new(PegController::new(ledger, oracle, Arc::new(MemoryStore::new()), config).unwrap())
    }

    #[test]
    fn status_payload_has_the_documented_shape() {
        let controller = controller();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(controller.run_epoch(1, 10, now));

        let status = status_json(&controller);
        assert_eq!(status["enabled"], true);
        assert_eq!(status["circuit_breaker"], false);
        assert_eq!(status["epoch_id"], 1);
        assert_eq!(status["last_action"], "expand");
        assert_eq!(status["price_usd"], 1.05);
        // 128-bit amounts arrive as decimal strings.
        assert!(status["supply"].is_string());
        assert!(status["last_delta"].is_string());
        assert_eq!(status["config"]["k"], 0.05);
        assert_eq!(status["config"]["treasury_address"], TREASURY);
        // Pure-proportional mode omits the PID fields.
        assert!(status["config"].get("ki").is_none());
        assert!(status["config"].get("integral").is_none());
    }

    #[test]
    fn history_payload_lists_events_newest_first() {
        let controller = controller();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(controller.run_epoch(1, 10, now));
        assert!(controller.run_epoch(2, 20, now + 1));

        let history = history_json(&controller, 500);
        assert_eq!(history["count"], 2);
        assert_eq!(history["events"][0]["epoch_id"], 2);
        assert_eq!(history["events"][1]["epoch_id"], 1);
        assert!(history["events"][0]["delta"].is_string());
    }

    #[test]
    fn history_count_is_capped() {
        let controller = controller();
        let history = history_json(&controller, 1_000_000);
        assert_eq!(history["count"], 0);
    }
}
