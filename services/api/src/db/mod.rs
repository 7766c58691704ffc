//! Data Access Layer
//!
//! Handlers talk to storage through the [`PracticeStore`] trait. [`Db`] is the
//! PostgreSQL adapter used by the service; [`MemoryStore`] keeps the same rows
//! in process for tests and local experiments.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Db;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::FromRow;
use studyguide_core::confidence::MasteryState;
use uuid::Uuid;

use crate::models::{
    NewProblem, PracticeSession, Problem, ProblemAttempt, SessionHistoryEntry, SessionSummary,
    SessionType, StudyGuide, Topic, TopicProgress, TopicSignalRow, WeakTopic,
};

/// A progress row joined with its topic's name.
#[derive(FromRow, Debug, Clone)]
pub struct NamedTopicProgress {
    #[sqlx(flatten)]
    pub progress: TopicProgress,
    pub topic_name: String,
}

/// Storage contract for guides, practice sessions and topic progress.
///
/// Lookups return `Ok(None)` for missing rows; deletes report whether a row
/// was removed. Removing a guide or topic removes everything beneath it.
#[async_trait]
pub trait PracticeStore: Send + Sync {
    // --- Study guides ---

    async fn create_study_guide(
        &self,
        user_id: Uuid,
        title: &str,
        original_filename: Option<&str>,
    ) -> Result<StudyGuide>;

    async fn get_study_guide(&self, guide_id: i64) -> Result<Option<StudyGuide>>;

    /// The user's guides, newest first.
    async fn list_study_guides(&self, user_id: Uuid) -> Result<Vec<StudyGuide>>;

    /// `None` arguments keep the stored value.
    async fn update_study_guide(
        &self,
        guide_id: i64,
        title: Option<&str>,
        original_filename: Option<&str>,
    ) -> Result<Option<StudyGuide>>;

    async fn delete_study_guide(&self, guide_id: i64) -> Result<bool>;

    // --- Topics ---

    /// Appends after the guide's highest `order_index` when none is given.
    async fn create_topic(
        &self,
        guide_id: i64,
        name: &str,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Topic>;

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>>;

    /// Lists a guide's topics in display order.
    async fn list_topics_for_guide(&self, guide_id: i64) -> Result<Vec<Topic>>;

    async fn update_topic(
        &self,
        topic_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Option<Topic>>;

    async fn delete_topic(&self, topic_id: i64) -> Result<bool>;

    // --- Problems ---

    /// Inserts every problem or none of them.
    async fn create_problems(&self, topic_id: i64, problems: &[NewProblem]) -> Result<Vec<Problem>>;

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>>;

    /// Problems of a topic, minus the excluded ids, ordered by id.
    async fn list_candidate_problems(&self, topic_id: i64, excluded: &[i64])
    -> Result<Vec<Problem>>;

    /// Counts the problems across every topic of a guide.
    async fn count_guide_problems(&self, guide_id: i64) -> Result<i64>;

    async fn delete_problem(&self, problem_id: i64) -> Result<bool>;

    // --- Sessions and attempts ---

    /// Starts a practice session. Exam-mode sessions are always timed.
    async fn start_session(
        &self,
        user_id: Uuid,
        guide_id: i64,
        session_type: SessionType,
        questions_count: Option<i32>,
        time_limit_minutes: Option<i32>,
    ) -> Result<PracticeSession>;

    async fn get_session(&self, session_id: i64) -> Result<Option<PracticeSession>>;

    /// Stamps `ended_at` and tallies the session's attempts atomically.
    ///
    /// Returns `None` when the session does not exist or has already ended.
    async fn end_session(&self, session_id: i64) -> Result<Option<SessionSummary>>;

    /// The user's sessions, most recently started first.
    async fn list_sessions(
        &self,
        user_id: Uuid,
        guide_id: Option<i64>,
    ) -> Result<Vec<SessionHistoryEntry>>;

    /// Ids of problems already attempted in a session.
    async fn session_problem_ids(&self, session_id: i64) -> Result<Vec<i64>>;

    /// Ids of problems the user has attempted in any session.
    async fn user_attempted_problem_ids(&self, user_id: Uuid) -> Result<Vec<i64>>;

    async fn record_attempt(
        &self,
        session_id: i64,
        problem_id: i64,
        user_answer: &str,
        is_correct: bool,
        hints_used: i32,
        confidence_rating: Option<i32>,
    ) -> Result<ProblemAttempt>;

    // --- Topic progress ---

    /// The confidence and recency of each listed topic the user has progress on.
    async fn topic_signals(&self, user_id: Uuid, topic_ids: &[i64]) -> Result<Vec<TopicSignalRow>>;

    async fn get_topic_progress(&self, user_id: Uuid, topic_id: i64)
    -> Result<Option<TopicProgress>>;

    /// Writes the new mastery state and stamps `last_practiced`.
    async fn upsert_topic_progress(
        &self,
        user_id: Uuid,
        topic_id: i64,
        state: &MasteryState,
    ) -> Result<TopicProgress>;

    /// The user's progress rows for every topic of a guide, in topic order.
    async fn guide_progress(&self, user_id: Uuid, guide_id: i64) -> Result<Vec<NamedTopicProgress>>;

    /// Practiced topics with confidence below `threshold`, weakest first.
    async fn weak_topics(
        &self,
        user_id: Uuid,
        guide_id: Option<i64>,
        threshold: f64,
    ) -> Result<Vec<WeakTopic>>;
}
