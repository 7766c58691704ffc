use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::Value;
use std::sync::Arc;
use studyguide_core::confidence::{self, ConfidenceLevel};
use tracing::info;

use super::{ApiError, ApiJson, ApiQuery};
use crate::{
    models::{
        ErrorResponse, TopicProgress, TopicProgressSummary, UpdateConfidencePayload,
        UpdateConfidenceResponse, UserGuideQuery, UserQuery, WeakTopic,
    },
    state::AppState,
};

/// Reads a 1-3 rating sent as a number or numeric string. Anything else means
/// "no rating".
fn confidence_level(value: &Value) -> Option<ConfidenceLevel> {
    let rating = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    ConfidenceLevel::from_rating(rating)
}

/// Fold one answer into the learner's topic confidence.
#[utoipa::path(
    post,
    path = "/update-confidence",
    request_body = UpdateConfidencePayload,
    responses(
        (status = 200, description = "Updated progress", body = UpdateConfidenceResponse),
        (status = 400, description = "Missing required parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn update_confidence(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<UpdateConfidencePayload>,
) -> Result<Json<UpdateConfidenceResponse>, ApiError> {
    let (Some(user_id), Some(topic_id), Some(was_correct)) =
        (payload.user_id, payload.topic_id, payload.was_correct)
    else {
        return Err(ApiError::BadRequest("Missing required parameters".to_string()));
    };
    let level = payload.user_confidence.as_ref().and_then(confidence_level);

    let previous = state
        .db
        .get_topic_progress(user_id, topic_id)
        .await?
        .as_ref()
        .map(TopicProgress::mastery_state);
    let next = confidence::update_confidence(
        previous.as_ref(),
        was_correct,
        level,
        payload.hints_used_count,
    );

    let progress = state
        .db
        .upsert_topic_progress(user_id, topic_id, &next)
        .await?;
    info!(
        topic_id,
        was_correct,
        confidence = progress.current_confidence,
        mastered = progress.mastered,
        "Topic confidence updated"
    );

    Ok(Json(UpdateConfidenceResponse {
        success: true,
        progress,
    }))
}

/// The learner's progress on every topic of a study guide.
#[utoipa::path(
    get,
    path = "/study-guides/{id}/progress",
    responses(
        (status = 200, description = "Per-topic progress", body = [TopicProgressSummary]),
        (status = 404, description = "Study guide not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Study guide ID"),
        ("userId" = String, Query, description = "The learner's user ID")
    )
)]
pub async fn guide_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<Vec<TopicProgressSummary>>, ApiError> {
    state
        .db
        .get_study_guide(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Study guide not found".to_string()))?;

    let summaries = state
        .db
        .guide_progress(query.user_id, id)
        .await?
        .into_iter()
        .map(|row| TopicProgressSummary {
            accuracy: row.progress.accuracy(),
            progress: row.progress,
            topic_name: row.topic_name,
        })
        .collect();

    Ok(Json(summaries))
}

/// Topics the learner has practiced but not yet gained confidence in.
#[utoipa::path(
    get,
    path = "/weak-topics",
    responses(
        (status = 200, description = "Weakest topics first", body = [WeakTopic]),
        (status = 400, description = "Missing userId", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("userId" = String, Query, description = "The learner's user ID"),
        ("studyGuideId" = Option<i64>, Query, description = "Restrict to one study guide")
    )
)]
pub async fn weak_topics(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserGuideQuery>,
) -> Result<Json<Vec<WeakTopic>>, ApiError> {
    let topics = state
        .db
        .weak_topics(
            query.user_id,
            query.study_guide_id,
            confidence::WEAK_TOPIC_THRESHOLD,
        )
        .await?;
    Ok(Json(topics))
}
