use anyhow::anyhow;
use axum::{extract::State, response::Json};
use std::sync::Arc;
use studyguide_core::{
    generation::{GeneratedProblemResponse, GenerationError, GenerationRequest},
    llm_client::{Attachment, CompletionRequest},
    math::{MathError, MathRequest, MathSolution},
    prompts,
};
use tracing::info;

use super::{ApiError, ApiJson};
use crate::{
    models::{CallClaudePayload, CallClaudeResponse, ErrorResponse, RateLimitErrorResponse, TextBlock},
    state::AppState,
};

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn generation_failure(err: GenerationError) -> ApiError {
    match err {
        GenerationError::MissingTopic => ApiError::BadRequest(err.to_string()),
        GenerationError::Upstream(inner) => ApiError::Upstream(inner),
        GenerationError::MalformedJson | GenerationError::InvalidStructure(_) => {
            ApiError::InvalidContent(err.to_string())
        }
    }
}

fn math_failure(err: MathError) -> ApiError {
    match err {
        MathError::MissingProblem => ApiError::BadRequest(err.to_string()),
        MathError::Upstream(inner) => ApiError::Upstream(inner),
    }
}

/// Send a free-form prompt, optionally with a stored study file attached.
///
/// Without a `prompt`, the `task` template (default `extract_topics`) is used.
#[utoipa::path(
    post,
    path = "/call-claude",
    request_body = CallClaudePayload,
    responses(
        (status = 200, description = "Model reply", body = CallClaudeResponse),
        (status = 400, description = "Neither prompt nor filePath given", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn call_claude(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CallClaudePayload>,
) -> Result<Json<CallClaudeResponse>, ApiError> {
    let prompt = non_blank(payload.prompt);
    let file_path = non_blank(payload.file_path);
    if prompt.is_none() && file_path.is_none() {
        return Err(ApiError::BadRequest("Prompt is required".to_string()));
    }

    let attachment = match &file_path {
        Some(path) => {
            let store = state
                .file_store
                .as_ref()
                .ok_or_else(|| ApiError::Upstream(anyhow!("File storage is not configured")))?;
            let file = store.download(&payload.bucket, path).await?;
            let file_name = payload
                .file_name
                .clone()
                .or_else(|| path.rsplit('/').next().map(str::to_string));
            info!(bucket = %payload.bucket, %path, media_type = %file.media_type, "Attaching stored file");
            Some(Attachment {
                file_name,
                media_type: file.media_type,
                data: file.data,
            })
        }
        None => None,
    };

    let prompt = match prompt {
        Some(prompt) => prompt,
        None => {
            let task = payload.task.as_deref().unwrap_or(prompts::EXTRACT_TOPICS);
            if !state.prompts.contains_key(task) {
                return Err(ApiError::BadRequest(format!("Unknown task: '{task}'")));
            }
            let file_name = attachment
                .as_ref()
                .and_then(|a| a.file_name.clone())
                .unwrap_or_default();
            prompts::render(&state.prompts, task, &[("file_name", &file_name)])?
        }
    };

    let mut request = CompletionRequest::new(prompt, payload.max_tokens);
    if let Some(system) = non_blank(payload.system_prompt) {
        request = request.with_system(system);
    }
    if let Some(attachment) = attachment {
        request = request.with_attachment(attachment);
    }

    let completion = state.completion_client.complete(request).await?;
    Ok(Json(CallClaudeResponse {
        content: vec![TextBlock {
            kind: "text".to_string(),
            text: completion.text,
        }],
        model: completion.model,
        stop_reason: completion.stop_reason,
    }))
}

/// Generate a validated multiple-choice problem for a topic.
#[utoipa::path(
    post,
    path = "/generate-simple-problem",
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Generated problem", body = GeneratedProblemResponse),
        (status = 400, description = "Topic is required", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitErrorResponse),
        (status = 500, description = "Upstream failure or invalid model output", body = ErrorResponse)
    )
)]
pub async fn generate_simple_problem(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<GenerationRequest>,
) -> Result<Json<GeneratedProblemResponse>, ApiError> {
    let problem = state
        .generator
        .generate(&payload)
        .await
        .map_err(generation_failure)?;
    Ok(Json(problem))
}

/// Solve a math problem step by step.
#[utoipa::path(
    post,
    path = "/solve-math",
    request_body = MathRequest,
    responses(
        (status = 200, description = "Worked solution", body = MathSolution),
        (status = 400, description = "Problem statement is required", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn solve_math(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<MathRequest>,
) -> Result<Json<MathSolution>, ApiError> {
    let solution = state
        .math_solver
        .solve(&payload)
        .await
        .map_err(math_failure)?;
    Ok(Json(solution))
}
