//! HTTP endpoints.
//!
//! One conversational endpoint plus session inspection, health and
//! metrics. Handlers map orchestration failures to status codes; all
//! user-visible degradation is already handled inside the agent.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use booking_agent_core::AgentReply;

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.settings.server.request_timeout_secs);

    Router::new()
        .route("/api/agent/message", post(process_message))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/admin/reindex-faq", post(reindex_faq))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        // The agent sits behind the clinic's own frontends; origin policy
        // is enforced at the edge.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    session_id: String,
    #[serde(flatten)]
    reply: AgentReply,
}

async fn process_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    if request.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state
        .orchestrator
        .process_message(request.session_id.as_deref(), &request.message)
        .await
    {
        Ok((session_id, reply)) => Ok(Json(MessageResponse { session_id, reply })),
        Err(err) => {
            tracing::error!(error = %err, "message processing failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state.store.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(serde_json::json!({
        "sessionId": session.id,
        "slots": session.slots,
        "messageCount": session.context.message_count,
        "lastScenario": session.context.last_scenario,
        "createdAt": session.created_at,
    })))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.store.delete(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn reindex_faq(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.indexer.reindex().await {
        Ok(report) => Ok(Json(serde_json::json!({
            "success": true,
            "indexed": report.indexed,
        }))),
        Err(err) => {
            tracing::error!(error = %err, "FAQ reindex failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let catalogs = state.preload.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.store.len(),
        "catalogsLoaded": !catalogs.procedures.is_empty(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_agent_core::{Scenario, SlotSet};

    #[test]
    fn message_request_accepts_camel_case() {
        let request: MessageRequest =
            serde_json::from_str(r#"{"sessionId": "abc", "message": "Hi"}"#).unwrap();
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.message, "Hi");
    }

    #[test]
    fn session_id_is_optional() {
        let request: MessageRequest = serde_json::from_str(r#"{"message": "Hi"}"#).unwrap();
        assert!(request.session_id.is_none());
    }

    #[test]
    fn response_flattens_reply_fields() {
        let response = MessageResponse {
            session_id: "abc".to_string(),
            reply: AgentReply::text("hello", SlotSet::default(), Scenario::Greeting),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["response"], "hello");
        assert_eq!(value["needsHuman"], false);
        assert_eq!(value["scenario"], "greeting");
    }
}
