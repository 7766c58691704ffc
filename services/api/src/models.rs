//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use studyguide_core::{confidence::MasteryState, grading::AnswerKind, selector::Identified};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "problem_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    MultipleChoice,
    ShortAnswer,
    FreeResponse,
}

impl ProblemType {
    pub fn answer_kind(self) -> AnswerKind {
        match self {
            ProblemType::MultipleChoice => AnswerKind::Choice,
            ProblemType::ShortAnswer | ProblemType::FreeResponse => AnswerKind::Text,
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemType::MultipleChoice => write!(f, "multiple_choice"),
            ProblemType::ShortAnswer => write!(f, "short_answer"),
            ProblemType::FreeResponse => write!(f, "free_response"),
        }
    }
}

#[derive(
    sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default,
)]
#[sqlx(type_name = "session_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Normal,
    WeakAreas,
    ExamMode,
    QuickPractice,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct StudyGuide {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub title: String,
    pub original_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: i64,
    pub study_guide_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i32,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Problem {
    pub id: i64,
    pub topic_id: i64,
    pub question_text: String,
    #[schema(value_type = String, example = "multiple_choice")]
    pub problem_type: ProblemType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub hints: Vec<String>,
    pub hint_penalty: f64,
    pub created_at: DateTime<Utc>,
}

impl Identified for Problem {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct PracticeSession {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub study_guide_id: i64,
    #[schema(value_type = String, example = "normal")]
    pub session_type: SessionType,
    pub questions_count: Option<i32>,
    pub time_limit_minutes: Option<i32>,
    pub is_timed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct ProblemAttempt {
    pub id: i64,
    pub session_id: i64,
    pub problem_id: i64,
    pub user_answer: String,
    pub is_correct: bool,
    pub hints_used: i32,
    pub confidence_rating: Option<i32>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct TopicProgress {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub topic_id: i64,
    pub current_confidence: f64,
    pub problems_attempted: i32,
    pub problems_correct: i32,
    pub mastered: bool,
    pub last_practiced: Option<DateTime<Utc>>,
}

impl TopicProgress {
    /// Share of correct attempts as a percentage, 0 when nothing was attempted.
    pub fn accuracy(&self) -> f64 {
        accuracy_percent(self.problems_correct as i64, self.problems_attempted as i64)
    }

    pub fn mastery_state(&self) -> MasteryState {
        MasteryState {
            current_confidence: self.current_confidence,
            problems_attempted: self.problems_attempted,
            problems_correct: self.problems_correct,
            mastered: self.mastered,
        }
    }
}

/// `correct / total` as a percentage rounded to two decimals.
pub fn accuracy_percent(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (correct as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// The fields the topic draw reads from a progress row.
#[derive(FromRow, Debug, Clone, PartialEq)]
pub struct TopicSignalRow {
    pub topic_id: i64,
    pub current_confidence: f64,
    pub last_practiced: Option<DateTime<Utc>>,
}

// --- Study guide library ---

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudyGuidePayload {
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub title: String,
    pub original_filename: Option<String>,
}

/// Absent or blank fields keep their stored value.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudyGuidePayload {
    pub title: Option<String>,
    pub original_filename: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicPayload {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to one past the guide's highest index.
    pub order_index: Option<i32>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub order_index: Option<i32>,
}

fn default_hint_penalty() -> f64 {
    0.1
}

#[derive(Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProblem {
    pub question_text: String,
    #[schema(value_type = String, example = "multiple_choice")]
    pub problem_type: ProblemType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default = "default_hint_penalty")]
    pub hint_penalty: f64,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct BulkProblemsPayload {
    pub problems: Vec<NewProblem>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct DeletedResponse {
    pub message: String,
}

// --- History ---

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserGuideQuery {
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub study_guide_id: Option<i64>,
}

/// A past or running session with its guide title and attempt count.
#[derive(Serialize, ToSchema, FromRow, Debug, Clone)]
pub struct SessionHistoryEntry {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub session: PracticeSession,
    pub study_guide_title: String,
    pub attempt_count: i64,
}

#[derive(Serialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct WeakTopic {
    pub topic_id: i64,
    pub topic_name: String,
    pub study_guide_id: i64,
    pub current_confidence: f64,
    pub problems_attempted: i32,
    pub problems_correct: i32,
    pub last_practiced: Option<DateTime<Utc>>,
}

// --- Practice selection ---

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectProblemPayload {
    #[schema(value_type = Option<String>, format = Uuid)]
    pub user_id: Option<Uuid>,
    pub session_id: Option<i64>,
    pub topic_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub exclude_problem_ids: Vec<i64>,
}

/// A problem as shown to the learner: no answer and no hint text.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ProblemView {
    pub id: i64,
    pub topic_id: i64,
    pub question_text: String,
    #[schema(value_type = String, example = "multiple_choice")]
    pub problem_type: ProblemType,
    pub options: Option<Vec<String>>,
    pub explanation: Option<String>,
    pub hint_count: usize,
}

impl From<&Problem> for ProblemView {
    fn from(problem: &Problem) -> Self {
        Self {
            id: problem.id,
            topic_id: problem.topic_id,
            question_text: problem.question_text.clone(),
            problem_type: problem.problem_type,
            options: problem.options.clone(),
            explanation: problem.explanation.clone(),
            hint_count: problem.hints.len(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TopicRef {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SelectProblemResponse {
    pub problem: ProblemView,
    pub topic: TopicRef,
}

// --- Confidence ---

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfidencePayload {
    #[schema(value_type = Option<String>, format = Uuid)]
    pub user_id: Option<Uuid>,
    pub topic_id: Option<i64>,
    pub was_correct: Option<bool>,
    /// 1 (not confident), 2 (neutral) or 3 (very confident). Other values are ignored.
    #[schema(value_type = Option<i64>)]
    pub user_confidence: Option<serde_json::Value>,
    #[serde(default)]
    pub hints_used_count: u32,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UpdateConfidenceResponse {
    pub success: bool,
    pub progress: TopicProgress,
}

// --- Sessions ---

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionPayload {
    #[schema(value_type = String, format = Uuid)]
    pub user_id: Uuid,
    pub study_guide_id: i64,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "normal")]
    pub session_type: SessionType,
    pub questions_count: Option<i32>,
    pub time_limit_minutes: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct SessionSummary {
    pub id: i64,
    pub total_problems: i64,
    pub correct_answers: i64,
    pub accuracy: f64,
    pub ended_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    pub problem_id: i64,
    #[serde(default)]
    pub user_answer: String,
    #[serde(default)]
    pub hints_used: i32,
    pub confidence_rating: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub user_answer: String,
    pub attempt_id: i64,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub hint: String,
    pub penalty: f64,
    pub total_hints: usize,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TopicProgressSummary {
    #[serde(flatten)]
    pub progress: TopicProgress,
    pub topic_name: String,
    pub accuracy: f64,
}

// --- AI proxy ---

fn default_max_tokens() -> u32 {
    1024
}

fn default_bucket() -> String {
    "study-materials".to_string()
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CallClaudePayload {
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Name of a shipped prompt template to use when `prompt` is absent.
    pub task: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct CallClaudeResponse {
    pub content: Vec<TextBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitErrorResponse {
    pub error: String,
    pub code: String,
    pub retry_after: u64,
}
