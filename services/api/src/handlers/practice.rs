use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use studyguide_core::{
    grading,
    selector::{self, TopicSignal},
};
use tracing::{debug, info};

use super::{ApiError, ApiJson, ApiQuery};
use crate::{
    models::{
        ErrorResponse, HintResponse, PracticeSession, ProblemView, SelectProblemPayload,
        SelectProblemResponse, SessionHistoryEntry, SessionSummary, StartSessionPayload,
        SubmitAnswerPayload, SubmitAnswerResponse, TopicRef, UserGuideQuery,
    },
    state::AppState,
};

/// Pick the next problem for a learner.
///
/// The topic is drawn with a bias toward low confidence and staleness; the
/// problem is drawn from that topic, skipping anything already attempted in the
/// session or explicitly excluded.
#[utoipa::path(
    post,
    path = "/select-problem",
    request_body = SelectProblemPayload,
    responses(
        (status = 200, description = "Selected problem", body = SelectProblemResponse),
        (status = 400, description = "Missing required parameters", body = ErrorResponse),
        (status = 404, description = "No topic or problem available", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn select_problem(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SelectProblemPayload>,
) -> Result<Json<SelectProblemResponse>, ApiError> {
    let (Some(user_id), Some(session_id), Some(topic_ids)) = (
        payload.user_id,
        payload.session_id,
        payload.topic_ids.filter(|ids| !ids.is_empty()),
    ) else {
        return Err(ApiError::BadRequest("Missing required parameters".to_string()));
    };

    let mut excluded: HashSet<i64> = payload.exclude_problem_ids.iter().copied().collect();
    excluded.extend(state.db.session_problem_ids(session_id).await?);

    let progress: HashMap<i64, TopicSignal> = state
        .db
        .topic_signals(user_id, &topic_ids)
        .await?
        .into_iter()
        .map(|row| {
            (
                row.topic_id,
                TopicSignal {
                    current_confidence: row.current_confidence,
                    last_practiced: row.last_practiced,
                },
            )
        })
        .collect();

    let selection = {
        let mut rng = rand::rng();
        selector::select_topic(&topic_ids, &progress, Utc::now(), &mut rng)
    }
    .ok_or_else(|| ApiError::NotFound("No suitable topic found".to_string()))?;
    if selection.fallback {
        debug!(topic_id = selection.topic_id, "Topic draw exhausted weights; used last topic");
    }

    let topic = state
        .db
        .get_topic(selection.topic_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Topic not found".to_string()))?;

    let attempted: HashSet<i64> = state
        .db
        .user_attempted_problem_ids(user_id)
        .await?
        .into_iter()
        .collect();
    let excluded_ids: Vec<i64> = excluded.iter().copied().collect();
    let candidates = state
        .db
        .list_candidate_problems(topic.id, &excluded_ids)
        .await?;

    let pick = {
        let mut rng = rand::rng();
        selector::select_problem(&candidates, &excluded, &attempted, &mut rng)
            .map(|pick| (ProblemView::from(pick.problem), pick.preferred_new))
    };
    let Some((problem, preferred_new)) = pick else {
        return Err(ApiError::NotFound("No problems available".to_string()));
    };
    debug!(
        problem_id = problem.id,
        topic_id = topic.id,
        preferred_new,
        "Selected problem"
    );

    Ok(Json(SelectProblemResponse {
        problem,
        topic: TopicRef {
            id: topic.id,
            name: topic.name,
        },
    }))
}

/// Start a practice session against a study guide.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = StartSessionPayload,
    responses(
        (status = 201, description = "Session started", body = PracticeSession),
        (status = 400, description = "Study guide has no topics or problems", body = ErrorResponse),
        (status = 404, description = "Study guide not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<StartSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .get_study_guide(payload.study_guide_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Study guide not found".to_string()))?;

    let topics = state.db.list_topics_for_guide(payload.study_guide_id).await?;
    if topics.is_empty() {
        return Err(ApiError::BadRequest(
            "Study guide has no topics".to_string(),
        ));
    }
    if state.db.count_guide_problems(payload.study_guide_id).await? == 0 {
        return Err(ApiError::BadRequest(
            "Study guide has no problems".to_string(),
        ));
    }

    let session = state
        .db
        .start_session(
            payload.user_id,
            payload.study_guide_id,
            payload.session_type,
            payload.questions_count,
            payload.time_limit_minutes,
        )
        .await?;
    info!(session_id = session.id, session_type = ?session.session_type, "Practice session started");

    Ok((StatusCode::CREATED, Json(session)))
}

/// The learner's practice sessions, most recent first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Session history", body = [SessionHistoryEntry]),
        (status = 400, description = "Missing userId", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("userId" = String, Query, description = "The learner's user ID"),
        ("studyGuideId" = Option<i64>, Query, description = "Restrict to one study guide")
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserGuideQuery>,
) -> Result<Json<Vec<SessionHistoryEntry>>, ApiError> {
    let sessions = state
        .db
        .list_sessions(query.user_id, query.study_guide_id)
        .await?;
    Ok(Json(sessions))
}

/// End a practice session and summarize its attempts.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    responses(
        (status = 200, description = "Session summary", body = SessionSummary),
        (status = 400, description = "Session already ended", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Session ID")
    )
)]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SessionSummary>, ApiError> {
    let session = state
        .db
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Practice session not found".to_string()))?;
    if session.ended_at.is_some() {
        return Err(ApiError::BadRequest(
            "This session has already ended".to_string(),
        ));
    }

    let summary = state
        .db
        .end_session(id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("This session has already ended".to_string()))?;
    info!(
        session_id = id,
        total = summary.total_problems,
        correct = summary.correct_answers,
        "Practice session ended"
    );

    Ok(Json(summary))
}

/// Grade and record an answer.
#[utoipa::path(
    post,
    path = "/sessions/{id}/attempts",
    request_body = SubmitAnswerPayload,
    responses(
        (status = 200, description = "Graded attempt", body = SubmitAnswerResponse),
        (status = 400, description = "Invalid submission or session already ended", body = ErrorResponse),
        (status = 404, description = "Session or problem not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Session ID")
    )
)]
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<SubmitAnswerPayload>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    if payload
        .confidence_rating
        .is_some_and(|rating| !(1..=3).contains(&rating))
    {
        return Err(ApiError::BadRequest(
            "confidence_rating must be 1, 2, or 3".to_string(),
        ));
    }
    if payload.hints_used < 0 {
        return Err(ApiError::BadRequest(
            "hintsUsed must not be negative".to_string(),
        ));
    }

    let session = state
        .db
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Practice session not found".to_string()))?;
    if session.ended_at.is_some() {
        return Err(ApiError::BadRequest(
            "This session has already ended".to_string(),
        ));
    }

    let problem = state
        .db
        .get_problem(payload.problem_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Problem not found".to_string()))?;

    let user_answer = payload.user_answer.trim();
    let is_correct = grading::is_correct(
        problem.problem_type.answer_kind(),
        &problem.correct_answer,
        user_answer,
    );

    let attempt = state
        .db
        .record_attempt(
            session.id,
            problem.id,
            user_answer,
            is_correct,
            payload.hints_used,
            payload.confidence_rating,
        )
        .await?;
    info!(
        session_id = session.id,
        problem_id = problem.id,
        problem_type = %problem.problem_type,
        is_correct,
        "Attempt recorded"
    );

    Ok(Json(SubmitAnswerResponse {
        is_correct,
        correct_answer: problem.correct_answer,
        explanation: problem.explanation,
        user_answer: attempt.user_answer,
        attempt_id: attempt.id,
    }))
}

/// Reveal one hint of a problem.
#[utoipa::path(
    get,
    path = "/problems/{id}/hints/{index}",
    responses(
        (status = 200, description = "The hint and its confidence penalty", body = HintResponse),
        (status = 400, description = "Hint index out of range", body = ErrorResponse),
        (status = 404, description = "Problem not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Problem ID"),
        ("index" = usize, Path, description = "Zero-based hint index")
    )
)]
pub async fn get_hint(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(i64, usize)>,
) -> Result<Json<HintResponse>, ApiError> {
    let problem = state
        .db
        .get_problem(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Problem not found".to_string()))?;

    let total_hints = problem.hints.len();
    let hint = problem
        .hints
        .into_iter()
        .nth(index)
        .ok_or_else(|| ApiError::BadRequest(format!(
            "Hint index {index} is out of range; problem has {total_hints} hints"
        )))?;

    Ok(Json(HintResponse {
        hint,
        penalty: problem.hint_penalty,
        total_hints,
    }))
}
