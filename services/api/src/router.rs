//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the rate-limited AI routes, and OpenAPI documentation.

use crate::{
    handlers::{ai, library, practice, progress},
    models::{
        BulkProblemsPayload, CallClaudePayload, CallClaudeResponse, CreateStudyGuidePayload,
        CreateTopicPayload, DeletedResponse, ErrorResponse, HintResponse, NewProblem,
        PracticeSession, Problem, ProblemType, ProblemView, RateLimitErrorResponse,
        SelectProblemPayload, SelectProblemResponse, SessionHistoryEntry, SessionSummary,
        SessionType, StartSessionPayload, StudyGuide, SubmitAnswerPayload, SubmitAnswerResponse,
        TextBlock, Topic, TopicProgress, TopicProgressSummary, TopicRef, UpdateConfidencePayload,
        UpdateConfidenceResponse, UpdateStudyGuidePayload, UpdateTopicPayload, WeakTopic,
    },
    rate_limit::rate_limit,
    state::AppState,
};

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use studyguide_core::{
    generation::{
        ConceptualDepth, Difficulty, GeneratedProblemResponse, GenerationMetadata,
        GenerationRequest, ProblemStyle,
    },
    math::{MathRequest, MathSolution, SolutionStep},
    problem_shape::{GeneratedProblem, MultiPartProblem, ProblemPart, SinglePartProblem, Visual},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        library::create_study_guide,
        library::list_study_guides,
        library::get_study_guide,
        library::update_study_guide,
        library::delete_study_guide,
        library::list_topics,
        library::create_topic,
        library::update_topic,
        library::delete_topic,
        library::list_problems,
        library::create_problem,
        library::create_problems_bulk,
        library::delete_problem,
        practice::select_problem,
        practice::start_session,
        practice::list_sessions,
        practice::end_session,
        practice::submit_answer,
        practice::get_hint,
        progress::update_confidence,
        progress::guide_progress,
        progress::weak_topics,
        ai::call_claude,
        ai::generate_simple_problem,
        ai::solve_math,
    ),
    components(
        schemas(
            StudyGuide, CreateStudyGuidePayload, UpdateStudyGuidePayload,
            Topic, CreateTopicPayload, UpdateTopicPayload,
            Problem, NewProblem, BulkProblemsPayload, DeletedResponse,
            SessionHistoryEntry, WeakTopic,
            SelectProblemPayload, SelectProblemResponse, ProblemView, TopicRef, ProblemType,
            UpdateConfidencePayload, UpdateConfidenceResponse, TopicProgress, TopicProgressSummary,
            StartSessionPayload, PracticeSession, SessionType, SessionSummary,
            SubmitAnswerPayload, SubmitAnswerResponse, HintResponse,
            CallClaudePayload, CallClaudeResponse, TextBlock,
            GenerationRequest, GeneratedProblemResponse, GenerationMetadata, GeneratedProblem,
            SinglePartProblem, MultiPartProblem, ProblemPart, Visual,
            Difficulty, ConceptualDepth, ProblemStyle,
            MathRequest, MathSolution, SolutionStep,
            ErrorResponse, RateLimitErrorResponse
        )
    ),
    tags(
        (name = "Study Guide API", description = "Adaptive practice sessions and AI-assisted problem generation")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The AI proxy routes share one rate limiter.
    let ai_router = Router::new()
        .route("/call-claude", post(ai::call_claude))
        .route("/generate-simple-problem", post(ai::generate_simple_problem))
        .route("/solve-math", post(ai::solve_math))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&app_state.rate_limiter),
            rate_limit,
        ));

    let library_router = Router::new()
        .route(
            "/study-guides",
            post(library::create_study_guide).get(library::list_study_guides),
        )
        .route(
            "/study-guides/{id}",
            get(library::get_study_guide)
                .put(library::update_study_guide)
                .delete(library::delete_study_guide),
        )
        .route(
            "/study-guides/{id}/topics",
            get(library::list_topics).post(library::create_topic),
        )
        .route(
            "/topics/{id}",
            put(library::update_topic).delete(library::delete_topic),
        )
        .route(
            "/topics/{id}/problems",
            get(library::list_problems).post(library::create_problem),
        )
        .route("/topics/{id}/problems/bulk", post(library::create_problems_bulk))
        .route("/problems/{id}", delete(library::delete_problem));

    let api_router = Router::new()
        .route("/select-problem", post(practice::select_problem))
        .route("/update-confidence", post(progress::update_confidence))
        .route(
            "/sessions",
            post(practice::start_session).get(practice::list_sessions),
        )
        .route("/sessions/{id}/end", post(practice::end_session))
        .route("/sessions/{id}/attempts", post(practice::submit_answer))
        .route("/problems/{id}/hints/{index}", get(practice::get_hint))
        .route("/study-guides/{id}/progress", get(progress::guide_progress))
        .route("/weak-topics", get(progress::weak_topics))
        .merge(library_router)
        .merge(ai_router)
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
