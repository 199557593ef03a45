//! Request handlers for the API endpoints.
//!
//! Request bodies are taken as raw bytes and decoded by the typed message
//! constructors, so every boundary check lives in one place.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::warn;

use super::AppState;
use super::types::{Ack, ErrorResponse, StateResponse, TelemetryQuery};
use crate::error::{BoundaryError, CommandError, MutationError};
use crate::messages::{AssignDemand, DecisionMessage, EligibilityMessage, MarkActive, TelemetryFrame};
use crate::sim::planner::Planner;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn bad_request(err: BoundaryError) -> ApiError {
    warn!(error = %err, "malformed request rejected");
    error(StatusCode::BAD_REQUEST, err.to_string())
}

fn command_failed(err: CommandError) -> ApiError {
    match err {
        CommandError::Rejected(
            e @ (MutationError::UnknownMember { .. } | MutationError::UnknownConsumer { .. }),
        ) => error(StatusCode::NOT_FOUND, e.to_string()),
        CommandError::Rejected(e) => error(StatusCode::CONFLICT, e.to_string()),
        CommandError::Transport(e) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// `GET /health` → 200 `{"status": "ok"}`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Member ids mapped to their consumer ids.
///
/// `GET /members` → 200 + `{member: [consumer, ...]}`
pub async fn get_members(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, Vec<String>>> {
    Json(state.topology.consumer_ids())
}

/// Latest telemetry frame.
///
/// `GET /state` → 200 + `StateResponse` JSON (`latest: null` before the
/// first tick)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let latest = state.store.latest();
    Json(StateResponse {
        tick: latest.as_ref().map(|f| f.tick),
        latest,
    })
}

/// Telemetry frame history, optionally filtered by tick range.
///
/// `GET /telemetry?from=N&to=M` → frames with `N <= tick <= M`
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> Result<Json<Vec<TelemetryFrame>>, ApiError> {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(u64::MAX);
    if from > to {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("`from` ({from}) must be <= `to` ({to})"),
        ));
    }
    Ok(Json(state.store.frames(from, to)))
}

/// Assigns a new `(tau, delta)` demand to an idle consumer.
///
/// `POST /insert_tau_delta` → 200, 400 on a malformed body or counters
/// above the bound, 404 for an unknown consumer, 409 when it is not idle
pub async fn insert_tau_delta(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let request = AssignDemand::from_json(&body).map_err(bad_request)?;
    let ack = Ack {
        status: "assigned",
        member_id: request.member_id.clone(),
        consumer_id: request.consumer_id.clone(),
    };
    state
        .engine
        .assign_demand(request)
        .await
        .map_err(command_failed)?;
    Ok(Json(ack))
}

/// Marks a pending consumer active.
///
/// `POST /activate` → 200, 400 on a malformed body, 404 for an unknown
/// consumer, 409 when it is not pending
pub async fn activate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let request = MarkActive::from_json(&body).map_err(bad_request)?;
    let ack = Ack {
        status: "active",
        member_id: request.member_id.clone(),
        consumer_id: request.consumer_id.clone(),
    };
    state
        .engine
        .mark_active(request)
        .await
        .map_err(command_failed)?;
    Ok(Json(ack))
}

/// Runs the allocator over a posted eligibility message.
///
/// `POST /activable_consumers` → 200 + decision message, 400 on a
/// malformed body
pub async fn activable_consumers(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DecisionMessage>, ApiError> {
    let eligibility = EligibilityMessage::from_json(&body).map_err(bad_request)?;
    Ok(Json(state.planner.plan(&eligibility)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::pipeline::EngineHandle;
    use crate::sim::planner::GreedyPlanner;
    use crate::topology::Topology;
    use crate::transport::store::TelemetryStore;

    /// State whose engine handle has no engine behind it.
    fn make_test_state() -> Arc<AppState> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(AppState {
            topology: Topology::demo(),
            engine: EngineHandle::new(tx),
            store: Arc::new(TelemetryStore::new(10)),
            planner: GreedyPlanner,
        })
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(make_test_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn members_lists_consumers() {
        let app = router(make_test_state());
        let req = Request::builder().uri("/members").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let json = json_body(resp).await;
        assert_eq!(json["m1"], json!(["c1", "c2"]));
        assert_eq!(json["m3"], json!(["c5"]));
    }

    #[tokio::test]
    async fn state_before_first_tick_is_null() {
        let app = router(make_test_state());
        let req = Request::builder().uri("/state").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(json_body(resp).await["latest"].is_null());
    }

    #[tokio::test]
    async fn telemetry_inverted_range_returns_400() {
        let app = router(make_test_state());
        let req = Request::builder()
            .uri("/telemetry?from=10&to=5")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_assign_returns_400() {
        let app = router(make_test_state());
        let resp = app
            .oneshot(post("/insert_tau_delta", r#"{"member_id": "m1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stopped_engine_returns_503() {
        let app = router(make_test_state());
        let resp = app
            .oneshot(post("/activate", r#"{"member_id": "m1", "consumer_id": "c1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn activable_consumers_returns_decisions() {
        let app = router(make_test_state());
        let body = r#"{"members": {"m1": [
            {"consumer_id": "A", "cons_required": 6.0, "tau": 60, "delta": 65, "isUrgent": false},
            {"consumer_id": "B", "cons_required": 6.0, "tau": 60, "delta": 80, "isUrgent": false}
        ]}, "battery": 10.0}"#;
        let resp = app.oneshot(post("/activable_consumers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(
            json["m1"],
            json!([
                {"consumer_id": "A", "action": "activate"},
                {"consumer_id": "B", "action": "deactivate"}
            ])
        );
    }

    #[tokio::test]
    async fn assign_with_unbounded_deadline_returns_400() {
        let app = router(make_test_state());
        let body = r#"{"member_id": "m1", "consumer_id": "c1", "tau": 60, "delta": 18446744073709551615}"#;
        let resp = app.oneshot(post("/insert_tau_delta", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].as_str().unwrap().contains("delta"));
    }

    #[tokio::test]
    async fn activable_consumers_rejects_duplicate_consumer() {
        let app = router(make_test_state());
        let body = r#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": 6.0, "tau": 60, "delta": 65, "isUrgent": false},
            {"consumer_id": "c1", "cons_required": 6.0, "tau": 60, "delta": 65, "isUrgent": false}
        ]}, "battery": 10.0}"#;
        let resp = app.oneshot(post("/activable_consumers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = json_body(resp).await;
        assert!(json["error"].as_str().unwrap().contains("duplicate consumer `c1`"));
    }

    #[tokio::test]
    async fn activable_consumers_rejects_missing_battery() {
        let app = router(make_test_state());
        let resp = app
            .oneshot(post("/activable_consumers", r#"{"members": {}}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
