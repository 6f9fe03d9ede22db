//! Profiler handlers - submit / identify / train / status
//!
//! Thin wire layer over the profiler service: request shapes, the
//! auto-train trigger, and the mapping of pipeline errors onto HTTP.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::logic::events::KeystrokeEvent;
use crate::logic::profiler::{EngineStatus, IdentifyStatus};
use crate::logic::ProfilerError;
use crate::middleware::auth::UserContext;
use crate::{db, AppError, AppResult, AppState};

/// Body shared by submit and identify.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub platform: String,
    pub events: Vec<KeystrokeEvent>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub user: String,
    /// Percent in [0, 100].
    pub confidence: f32,
    pub message: String,
    pub status: IdentifyStatus,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Persist a labeled session under the authenticated subject.
pub async fn submit(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<SessionRequest>,
) -> AppResult<Json<MessageResponse>> {
    if req.events.is_empty() {
        return Err(AppError::ValidationError("events must not be empty".to_string()));
    }

    let id = db::insert_session(&state.pool, &user.user_id, &req.platform, &req.events).await?;
    tracing::info!(
        session_id = %id,
        user_id = %user.user_id,
        events = req.events.len(),
        "labeled session persisted"
    );

    maybe_trigger_auto_train(&state).await;

    Ok(Json(MessageResponse {
        message: format!("Session recorded ({} events)", req.events.len()),
    }))
}

/// Fire-and-forget training run after every Nth persisted session.
/// Failures are logged and never affect the submit response.
async fn maybe_trigger_auto_train(state: &AppState) {
    let every = state.config.auto_train_every;
    if every == 0 {
        return;
    }

    let count = match db::count_labeled_sessions(&state.pool).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("auto-train count query failed: {}", e);
            return;
        }
    };

    if count > 0 && count as u64 % every == 0 {
        tracing::info!(count, "auto-train triggered");
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_training(&state).await {
                tracing::warn!("auto-train failed: {}", e);
            }
        });
    }
}

/// Run one identification step for an anonymous evidence submission.
pub async fn identify(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<Json<IdentifyResponse>> {
    let outcome = state
        .profiler
        .identify(&req.events, req.session_id.as_deref())?;

    Ok(Json(IdentifyResponse {
        user: outcome.user,
        confidence: outcome.confidence,
        message: outcome.message,
        status: outcome.status,
        session_id: outcome.session_id,
    }))
}

/// Synchronous training run; swaps the live artifact on success.
pub async fn train(State(state): State<AppState>) -> AppResult<Json<MessageResponse>> {
    let metrics = run_training(&state).await?;

    Ok(Json(MessageResponse {
        message: format!(
            "Model trained: {} samples, {} subjects, micro accuracy {:.2}",
            metrics.total_samples, metrics.unique_labels, metrics.micro_acc
        ),
    }))
}

/// Engine status: live artifact, schema, session cache, last metrics.
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.profiler.engine_status())
}

/// Load sessions, then run the CPU-bound pipeline off the async pool.
async fn run_training(
    state: &AppState,
) -> Result<crate::logic::training::TrainingMetrics, ProfilerError> {
    let sessions = db::load_labeled_sessions(&state.pool)
        .await
        .map_err(|e| ProfilerError::Persistence(e.to_string()))?;

    let profiler = state.profiler.clone();
    tokio::task::spawn_blocking(move || profiler.train_and_publish(&sessions))
        .await
        .map_err(|e| ProfilerError::Computation(format!("training task failed: {}", e)))?
}
