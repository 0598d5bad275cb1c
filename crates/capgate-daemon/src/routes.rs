//! Axum router and HTTP handlers for policygate-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly without starting a real listener.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};

use capgate_audit::build_audit_event;
use capgate_execution::{apply_fill, order_type_str, evict_window, write_execution_event, Broker, ExecutionEvent};
use capgate_types::{MarketSnapshot, OrderIntent};

use crate::api_types::{ErrorResponse, HealthResponse, IntentRequest};
use crate::state::{AppState, SharedState};

/// Matches the original server's 64 KB request body ceiling.
pub const MAX_BODY_BYTES: usize = 65_536;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(get_health).fallback(method_not_allowed))
        .route("/intent", post(post_intent).fallback(method_not_allowed))
        .fallback(catch_all)
        .with_state(state)
}

/// `None` means no token is configured, so every request passes. A
/// configured token gates every route, including `/health`.
fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(token) = &state.token else {
        return Ok(());
    };
    let expected = format!("Bearer {token}");
    let ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if ok {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::with_message(
                "unauthorized",
                "Invalid or missing Bearer token.",
            )),
        )
            .into_response())
    }
}

async fn get_health(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }
    let st = state.inner.lock().await;
    let body = HealthResponse {
        status: "ok",
        run_id: st.run_id,
        policy_hash: st.engine.policy_hash().to_string(),
        positions_count: st.portfolio.positions.len(),
        kill_switch_active: st.execution.kill_switch_active,
        orders_last_60s_global: st.execution.orders_last_60s_global,
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn post_intent(State(state): State<SharedState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        return bad_request(
            "invalid_content_type",
            "Content-Type must be application/json.",
        );
    }

    let content_length = match headers.get(header::CONTENT_LENGTH) {
        None => {
            return bad_request(
                "missing_content_length",
                "Content-Length header is required.",
            );
        }
        Some(v) => match v.to_str().ok().and_then(|s| s.parse::<usize>().ok()) {
            Some(n) => n,
            None => {
                return bad_request(
                    "invalid_content_length",
                    "Content-Length must be an integer.",
                );
            }
        },
    };
    if content_length > MAX_BODY_BYTES {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::with_message(
                "payload_too_large",
                format!("Request body exceeds {MAX_BODY_BYTES} bytes."),
            )),
        )
            .into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request("invalid_json", e.to_string()),
    };
    let request: IntentRequest = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(_) => {
            return bad_request(
                "invalid_json",
                "Request body must be an object with an 'intent' key.",
            );
        }
    };

    let intent: OrderIntent = match serde_json::from_value(request.intent) {
        Ok(i) => i,
        Err(e) => return bad_request("invalid_json", format!("Invalid OrderIntent: {e}")),
    };
    if let Err(msg) = intent.validate() {
        return bad_request("invalid_json", format!("Invalid OrderIntent: {msg}"));
    }

    let market_override: Option<MarketSnapshot> = match request.market_snapshot {
        None => None,
        Some(v) => match serde_json::from_value::<MarketSnapshot>(v) {
            Ok(m) => match m.validate() {
                Ok(()) => Some(m),
                Err(msg) => {
                    return bad_request("invalid_json", format!("Invalid market_snapshot: {msg}"));
                }
            },
            Err(e) => {
                return bad_request("invalid_json", format!("Invalid market_snapshot: {e}"));
            }
        },
    };

    let mut st = state.inner.lock().await;
    let market = market_override.unwrap_or_else(|| st.market.clone());
    let decision = st.engine.evaluate(&intent, &st.portfolio, &market, &st.execution);

    if let Some(log) = &st.audit_log {
        let event = build_audit_event(
            &intent,
            &st.portfolio,
            &market,
            &st.execution,
            &decision,
            st.engine.policy_hash(),
            Some(st.run_id),
        );
        if let Err(e) = log.append(&event) {
            warn!(error = %e, "failed to append audit event");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_message("audit_write_failed", e.to_string())),
            )
                .into_response();
        }
    }

    if decision.is_routable() {
        let effective = decision.modified_intent.clone().unwrap_or_else(|| intent.clone());
        let run_id = st.run_id;
        let policy_hash = st.engine.policy_hash().to_string();

        match st.broker.submit(&effective, &market) {
            Ok(order_id) => {
                if let Some(path) = st.exec_log_path.clone() {
                    let event = ExecutionEvent::submitted(
                        &intent.intent_id,
                        &order_id,
                        Some(run_id),
                        Some(&policy_hash),
                        &effective.instrument.symbol,
                        effective.side,
                        effective.qty,
                        order_type_str(effective.order_type),
                    );
                    if let Err(e) = write_execution_event(&path, &event) {
                        warn!(error = %e, "failed to write execution event");
                    }
                }

                match st.broker.poll_fills(Some(&intent.timestamp)) {
                    Ok(fills) => {
                        for fill in &fills {
                            apply_fill(&mut st.portfolio, fill);
                            if let Some(path) = st.exec_log_path.clone() {
                                let event = ExecutionEvent::filled(
                                    &intent.intent_id,
                                    &fill.order_id,
                                    Some(run_id),
                                    Some(&policy_hash),
                                    &fill.symbol,
                                    fill.side,
                                    fill.qty,
                                    fill.price,
                                );
                                if let Err(e) = write_execution_event(&path, &event) {
                                    warn!(error = %e, "failed to write execution event");
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "poll_fills failed"),
                }

                st.execution.record_order(&intent.strategy_id);
            }
            Err(e) => {
                warn!(error = %e, "broker submit failed");
                if let Some(path) = st.exec_log_path.clone() {
                    let event = ExecutionEvent::rejected(
                        &intent.intent_id,
                        Some(run_id),
                        Some(&policy_hash),
                        &effective.instrument.symbol,
                    );
                    let _ = write_execution_event(&path, &event);
                }
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorResponse::with_message("broker_error", e.to_string())),
                )
                    .into_response();
            }
        }
    }

    for v in &decision.violations {
        st.execution
            .violations_last_window
            .push((intent.timestamp.clone(), v.rule_id.clone()));
    }
    // Evict and re-check the kill switch on every request, not only in the
    // stream runner — the rolling window and its trip condition are a
    // property of the execution state, not of which interface submitted
    // the intent.
    let window_seconds = st.engine.policy().limits.kill_switch.violation_window_seconds;
    st.execution.violations_last_window =
        evict_window(&st.execution.violations_last_window, &intent.timestamp, window_seconds);
    if decision.kill_switch_triggered {
        st.execution.kill_switch_active = true;
    }
    let trip_after_n = st.engine.policy().limits.kill_switch.trip_after_n_violations;
    if !st.execution.kill_switch_active
        && st.execution.violations_last_window.len() as u32 >= trip_after_n
    {
        st.execution.kill_switch_active = true;
    }

    info!(intent_id = %intent.intent_id, verdict = ?decision.decision, "evaluated intent");
    (StatusCode::OK, Json(decision)).into_response()
}

fn bad_request(error: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_message(error, message)),
    )
        .into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new("method_not_allowed")),
    )
        .into_response()
}

async fn catch_all(method: Method) -> Response {
    if matches!(method, Method::PUT | Method::DELETE | Method::PATCH) {
        method_not_allowed().await
    } else {
        (StatusCode::NOT_FOUND, Json(ErrorResponse::new("not_found"))).into_response()
    }
}
