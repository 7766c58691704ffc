//! Study guide, topic and problem management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use studyguide_core::{
    grading::{self, AnswerKind},
    problem_shape::MIN_OPTIONS,
};
use tracing::info;

use super::{ApiError, ApiJson, ApiQuery};
use crate::{
    models::{
        BulkProblemsPayload, CreateStudyGuidePayload, CreateTopicPayload, DeletedResponse,
        ErrorResponse, NewProblem, Problem, ProblemType, ProblemView, StudyGuide, Topic,
        UpdateStudyGuidePayload, UpdateTopicPayload, UserQuery,
    },
    state::AppState,
};

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn guide_not_found() -> ApiError {
    ApiError::NotFound("Study guide not found".to_string())
}

fn topic_not_found() -> ApiError {
    ApiError::NotFound("Topic not found".to_string())
}

/// Trims a submitted problem and checks it can be graded.
///
/// A multiple-choice answer is stored as the option text it matches.
fn validate_problem(problem: &NewProblem) -> Result<NewProblem, String> {
    let question_text = problem.question_text.trim();
    if question_text.is_empty() {
        return Err("questionText is required".to_string());
    }
    let mut correct_answer = problem.correct_answer.trim().to_string();
    if correct_answer.is_empty() {
        return Err("correctAnswer is required".to_string());
    }
    if !(0.0..=1.0).contains(&problem.hint_penalty) {
        return Err("hintPenalty must be between 0 and 1".to_string());
    }

    let options = problem.options.as_ref().map(|options| {
        options
            .iter()
            .map(|option| option.trim().to_string())
            .filter(|option| !option.is_empty())
            .collect::<Vec<_>>()
    });

    if problem.problem_type == ProblemType::MultipleChoice {
        let options = options
            .as_deref()
            .filter(|options| !options.is_empty())
            .ok_or("Options are required for multiple choice problems")?;
        if options.len() < MIN_OPTIONS {
            return Err(format!(
                "Multiple choice problems need at least {MIN_OPTIONS} options"
            ));
        }
        correct_answer = options
            .iter()
            .find(|option| grading::is_correct(AnswerKind::Choice, option, &correct_answer))
            .cloned()
            .ok_or("correctAnswer must match one of the options")?;
    }

    Ok(NewProblem {
        question_text: question_text.to_string(),
        problem_type: problem.problem_type,
        options,
        correct_answer,
        explanation: non_blank(problem.explanation.as_deref()).map(str::to_string),
        hints: problem
            .hints
            .iter()
            .map(|hint| hint.trim())
            .filter(|hint| !hint.is_empty())
            .map(str::to_string)
            .collect(),
        hint_penalty: problem.hint_penalty,
    })
}

// --- Study guides ---

/// Create a study guide.
#[utoipa::path(
    post,
    path = "/study-guides",
    request_body = CreateStudyGuidePayload,
    responses(
        (status = 201, description = "Study guide created", body = StudyGuide),
        (status = 400, description = "Title is required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_study_guide(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateStudyGuidePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let title = non_blank(Some(payload.title.as_str()))
        .ok_or_else(|| ApiError::BadRequest("Title is required".to_string()))?;
    let guide = state
        .db
        .create_study_guide(
            payload.user_id,
            title,
            non_blank(payload.original_filename.as_deref()),
        )
        .await?;
    info!(guide_id = guide.id, "Study guide created");
    Ok((StatusCode::CREATED, Json(guide)))
}

/// List a learner's study guides, newest first.
#[utoipa::path(
    get,
    path = "/study-guides",
    responses(
        (status = 200, description = "Study guides", body = [StudyGuide]),
        (status = 400, description = "Missing userId", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(("userId" = String, Query, description = "The learner's user ID"))
)]
pub async fn list_study_guides(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<Vec<StudyGuide>>, ApiError> {
    Ok(Json(state.db.list_study_guides(query.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/study-guides/{id}",
    responses(
        (status = 200, description = "The study guide", body = StudyGuide),
        (status = 404, description = "Study guide not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Study guide ID"))
)]
pub async fn get_study_guide(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<StudyGuide>, ApiError> {
    let guide = state
        .db
        .get_study_guide(id)
        .await?
        .ok_or_else(guide_not_found)?;
    Ok(Json(guide))
}

/// Rename a study guide or change its source filename.
#[utoipa::path(
    put,
    path = "/study-guides/{id}",
    request_body = UpdateStudyGuidePayload,
    responses(
        (status = 200, description = "Updated study guide", body = StudyGuide),
        (status = 404, description = "Study guide not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Study guide ID"))
)]
pub async fn update_study_guide(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateStudyGuidePayload>,
) -> Result<Json<StudyGuide>, ApiError> {
    let guide = state
        .db
        .update_study_guide(
            id,
            non_blank(payload.title.as_deref()),
            non_blank(payload.original_filename.as_deref()),
        )
        .await?
        .ok_or_else(guide_not_found)?;
    Ok(Json(guide))
}

/// Delete a study guide with its topics, problems and sessions.
#[utoipa::path(
    delete,
    path = "/study-guides/{id}",
    responses(
        (status = 200, description = "Deleted", body = DeletedResponse),
        (status = 404, description = "Study guide not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Study guide ID"))
)]
pub async fn delete_study_guide(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.db.delete_study_guide(id).await? {
        return Err(guide_not_found());
    }
    info!(guide_id = id, "Study guide deleted");
    Ok(Json(DeletedResponse {
        message: "Study guide deleted successfully".to_string(),
    }))
}

// --- Topics ---

#[utoipa::path(
    get,
    path = "/study-guides/{id}/topics",
    responses(
        (status = 200, description = "Topics in display order", body = [Topic]),
        (status = 404, description = "Study guide not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Study guide ID"))
)]
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    state
        .db
        .get_study_guide(id)
        .await?
        .ok_or_else(guide_not_found)?;
    Ok(Json(state.db.list_topics_for_guide(id).await?))
}

/// Add a topic to a study guide.
#[utoipa::path(
    post,
    path = "/study-guides/{id}/topics",
    request_body = CreateTopicPayload,
    responses(
        (status = 201, description = "Topic created", body = Topic),
        (status = 400, description = "Name is required", body = ErrorResponse),
        (status = 404, description = "Study guide not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Study guide ID"))
)]
pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<CreateTopicPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let name = non_blank(Some(payload.name.as_str()))
        .ok_or_else(|| ApiError::BadRequest("Name is required".to_string()))?;
    state
        .db
        .get_study_guide(id)
        .await?
        .ok_or_else(guide_not_found)?;

    let topic = state
        .db
        .create_topic(
            id,
            name,
            non_blank(payload.description.as_deref()),
            payload.order_index,
        )
        .await?;
    info!(guide_id = id, topic_id = topic.id, "Topic created");
    Ok((StatusCode::CREATED, Json(topic)))
}

#[utoipa::path(
    put,
    path = "/topics/{id}",
    request_body = UpdateTopicPayload,
    responses(
        (status = 200, description = "Updated topic", body = Topic),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Topic ID"))
)]
pub async fn update_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateTopicPayload>,
) -> Result<Json<Topic>, ApiError> {
    let topic = state
        .db
        .update_topic(
            id,
            non_blank(payload.name.as_deref()),
            payload.description.as_deref(),
            payload.order_index,
        )
        .await?
        .ok_or_else(topic_not_found)?;
    Ok(Json(topic))
}

/// Delete a topic with its problems and progress.
#[utoipa::path(
    delete,
    path = "/topics/{id}",
    responses(
        (status = 200, description = "Deleted", body = DeletedResponse),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Topic ID"))
)]
pub async fn delete_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.db.delete_topic(id).await? {
        return Err(topic_not_found());
    }
    Ok(Json(DeletedResponse {
        message: "Topic deleted successfully".to_string(),
    }))
}

// --- Problems ---

/// A topic's problems as the learner sees them.
#[utoipa::path(
    get,
    path = "/topics/{id}/problems",
    responses(
        (status = 200, description = "Problems without answers", body = [ProblemView]),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Topic ID"))
)]
pub async fn list_problems(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProblemView>>, ApiError> {
    state.db.get_topic(id).await?.ok_or_else(topic_not_found)?;
    let problems = state.db.list_candidate_problems(id, &[]).await?;
    Ok(Json(problems.iter().map(ProblemView::from).collect()))
}

/// Add one problem to a topic.
#[utoipa::path(
    post,
    path = "/topics/{id}/problems",
    request_body = NewProblem,
    responses(
        (status = 201, description = "Problem created", body = Problem),
        (status = 400, description = "Invalid problem", body = ErrorResponse),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Topic ID"))
)]
pub async fn create_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<NewProblem>,
) -> Result<impl IntoResponse, ApiError> {
    let problem = validate_problem(&payload).map_err(ApiError::BadRequest)?;
    state.db.get_topic(id).await?.ok_or_else(topic_not_found)?;

    let mut created = state.db.create_problems(id, &[problem]).await?;
    let problem = created
        .pop()
        .ok_or_else(|| ApiError::Upstream(anyhow::anyhow!("Problem insert returned no row")))?;
    info!(
        topic_id = id,
        problem_id = problem.id,
        problem_type = %problem.problem_type,
        "Problem created"
    );
    Ok((StatusCode::CREATED, Json(problem)))
}

/// Add several problems to a topic. Nothing is stored if any problem is invalid.
#[utoipa::path(
    post,
    path = "/topics/{id}/problems/bulk",
    request_body = BulkProblemsPayload,
    responses(
        (status = 201, description = "Problems created", body = [Problem]),
        (status = 400, description = "Invalid problem", body = ErrorResponse),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Topic ID"))
)]
pub async fn create_problems_bulk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<BulkProblemsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.problems.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one problem is required".to_string(),
        ));
    }
    let problems = payload
        .problems
        .iter()
        .enumerate()
        .map(|(index, problem)| {
            validate_problem(problem)
                .map_err(|message| ApiError::BadRequest(format!("Problem {index}: {message}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    state.db.get_topic(id).await?.ok_or_else(topic_not_found)?;

    let created = state.db.create_problems(id, &problems).await?;
    info!(topic_id = id, count = created.len(), "Problems created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    delete,
    path = "/problems/{id}",
    responses(
        (status = 200, description = "Deleted", body = DeletedResponse),
        (status = 404, description = "Problem not found", body = ErrorResponse)
    ),
    params(("id" = i64, Path, description = "Problem ID"))
)]
pub async fn delete_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.db.delete_problem(id).await? {
        return Err(ApiError::NotFound("Problem not found".to_string()));
    }
    Ok(Json(DeletedResponse {
        message: "Problem deleted successfully".to_string(),
    }))
}
