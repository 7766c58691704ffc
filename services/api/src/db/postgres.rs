//! PostgreSQL adapter. Queries are checked at runtime so the crate builds
//! without a live database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use studyguide_core::confidence::MasteryState;
use uuid::Uuid;

use super::{NamedTopicProgress, PracticeStore};
use crate::models::{
    NewProblem, PracticeSession, Problem, ProblemAttempt, SessionHistoryEntry, SessionSummary,
    SessionType, StudyGuide, Topic, TopicProgress, TopicSignalRow, WeakTopic, accuracy_percent,
};

const GUIDE_COLUMNS: &str = "id, user_id, title, original_filename, created_at";
const TOPIC_COLUMNS: &str = "id, study_guide_id, name, description, order_index";
const PROBLEM_COLUMNS: &str = "id, topic_id, question_text, problem_type, options, \
     correct_answer, explanation, hints, hint_penalty, created_at";
const SESSION_COLUMNS: &str = "id, user_id, study_guide_id, session_type, questions_count, \
     time_limit_minutes, is_timed, started_at, ended_at";
const PROGRESS_COLUMNS: &str = "id, user_id, topic_id, current_confidence, problems_attempted, \
     problems_correct, mastered, last_practiced";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PracticeStore for Db {
    async fn create_study_guide(
        &self,
        user_id: Uuid,
        title: &str,
        original_filename: Option<&str>,
    ) -> Result<StudyGuide> {
        let query = format!(
            "INSERT INTO study_guides (user_id, title, original_filename) VALUES ($1, $2, $3) \
             RETURNING {GUIDE_COLUMNS}"
        );
        let guide = sqlx::query_as::<_, StudyGuide>(&query)
            .bind(user_id)
            .bind(title)
            .bind(original_filename)
            .fetch_one(&self.pool)
            .await?;
        Ok(guide)
    }

    async fn get_study_guide(&self, guide_id: i64) -> Result<Option<StudyGuide>> {
        let query = format!("SELECT {GUIDE_COLUMNS} FROM study_guides WHERE id = $1");
        let guide = sqlx::query_as::<_, StudyGuide>(&query)
            .bind(guide_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(guide)
    }

    async fn list_study_guides(&self, user_id: Uuid) -> Result<Vec<StudyGuide>> {
        let query = format!(
            "SELECT {GUIDE_COLUMNS} FROM study_guides WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let guides = sqlx::query_as::<_, StudyGuide>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(guides)
    }

    async fn update_study_guide(
        &self,
        guide_id: i64,
        title: Option<&str>,
        original_filename: Option<&str>,
    ) -> Result<Option<StudyGuide>> {
        let query = format!(
            r#"
            UPDATE study_guides
            SET title = COALESCE($2, title),
                original_filename = COALESCE($3, original_filename)
            WHERE id = $1
            RETURNING {GUIDE_COLUMNS}
            "#
        );
        let guide = sqlx::query_as::<_, StudyGuide>(&query)
            .bind(guide_id)
            .bind(title)
            .bind(original_filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(guide)
    }

    async fn delete_study_guide(&self, guide_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM study_guides WHERE id = $1")
            .bind(guide_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_topic(
        &self,
        guide_id: i64,
        name: &str,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Topic> {
        let query = format!(
            r#"
            INSERT INTO topics (study_guide_id, name, description, order_index)
            VALUES (
                $1, $2, $3,
                COALESCE($4, (SELECT COALESCE(MAX(order_index), 0) + 1
                              FROM topics WHERE study_guide_id = $1))
            )
            RETURNING {TOPIC_COLUMNS}
            "#
        );
        let topic = sqlx::query_as::<_, Topic>(&query)
            .bind(guide_id)
            .bind(name)
            .bind(description)
            .bind(order_index)
            .fetch_one(&self.pool)
            .await?;
        Ok(topic)
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>> {
        let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = $1");
        let topic = sqlx::query_as::<_, Topic>(&query)
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(topic)
    }

    async fn list_topics_for_guide(&self, guide_id: i64) -> Result<Vec<Topic>> {
        let query = format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE study_guide_id = $1 \
             ORDER BY order_index ASC, id ASC"
        );
        let topics = sqlx::query_as::<_, Topic>(&query)
            .bind(guide_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(topics)
    }

    async fn update_topic(
        &self,
        topic_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Option<Topic>> {
        let query = format!(
            r#"
            UPDATE topics
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                order_index = COALESCE($4, order_index)
            WHERE id = $1
            RETURNING {TOPIC_COLUMNS}
            "#
        );
        let topic = sqlx::query_as::<_, Topic>(&query)
            .bind(topic_id)
            .bind(name)
            .bind(description)
            .bind(order_index)
            .fetch_optional(&self.pool)
            .await?;
        Ok(topic)
    }

    async fn delete_topic(&self, topic_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(topic_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_problems(&self, topic_id: i64, problems: &[NewProblem]) -> Result<Vec<Problem>> {
        let query = format!(
            r#"
            INSERT INTO problems
                (topic_id, question_text, problem_type, options, correct_answer, explanation,
                 hints, hint_penalty)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PROBLEM_COLUMNS}
            "#
        );

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(problems.len());
        for problem in problems {
            let row = sqlx::query_as::<_, Problem>(&query)
                .bind(topic_id)
                .bind(&problem.question_text)
                .bind(problem.problem_type)
                .bind(&problem.options)
                .bind(&problem.correct_answer)
                .bind(&problem.explanation)
                .bind(&problem.hints)
                .bind(problem.hint_penalty)
                .fetch_one(&mut *tx)
                .await?;
            created.push(row);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>> {
        let query = format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1");
        let problem = sqlx::query_as::<_, Problem>(&query)
            .bind(problem_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(problem)
    }

    async fn list_candidate_problems(
        &self,
        topic_id: i64,
        excluded: &[i64],
    ) -> Result<Vec<Problem>> {
        let query = format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE topic_id = $1 AND NOT (id = ANY($2)) ORDER BY id"
        );
        let problems = sqlx::query_as::<_, Problem>(&query)
            .bind(topic_id)
            .bind(excluded)
            .fetch_all(&self.pool)
            .await?;
        Ok(problems)
    }

    async fn count_guide_problems(&self, guide_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM problems p
            JOIN topics t ON t.id = p.topic_id
            WHERE t.study_guide_id = $1
            "#,
        )
        .bind(guide_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_problem(&self, problem_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM problems WHERE id = $1")
            .bind(problem_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        guide_id: i64,
        session_type: SessionType,
        questions_count: Option<i32>,
        time_limit_minutes: Option<i32>,
    ) -> Result<PracticeSession> {
        let query = format!(
            r#"
            INSERT INTO practice_sessions
                (user_id, study_guide_id, session_type, questions_count, time_limit_minutes, is_timed)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let session = sqlx::query_as::<_, PracticeSession>(&query)
            .bind(user_id)
            .bind(guide_id)
            .bind(session_type)
            .bind(questions_count)
            .bind(time_limit_minutes)
            .bind(session_type == SessionType::ExamMode)
            .fetch_one(&self.pool)
            .await?;
        Ok(session)
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<PracticeSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, PracticeSession>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn end_session(&self, session_id: i64) -> Result<Option<SessionSummary>> {
        let mut tx = self.pool.begin().await?;

        let ended_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE practice_sessions
            SET ended_at = NOW()
            WHERE id = $1 AND ended_at IS NULL
            RETURNING ended_at
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ended_at) = ended_at else {
            return Ok(None);
        };

        let (total, correct) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_correct)
            FROM problem_attempts
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(SessionSummary {
            id: session_id,
            total_problems: total,
            correct_answers: correct,
            accuracy: accuracy_percent(correct, total),
            ended_at,
        }))
    }

    async fn list_sessions(
        &self,
        user_id: Uuid,
        guide_id: Option<i64>,
    ) -> Result<Vec<SessionHistoryEntry>> {
        let rows = sqlx::query_as::<_, SessionHistoryEntry>(
            r#"
            SELECT s.id, s.user_id, s.study_guide_id, s.session_type, s.questions_count,
                   s.time_limit_minutes, s.is_timed, s.started_at, s.ended_at,
                   g.title AS study_guide_title, COUNT(a.id) AS attempt_count
            FROM practice_sessions s
            JOIN study_guides g ON g.id = s.study_guide_id
            LEFT JOIN problem_attempts a ON a.session_id = s.id
            WHERE s.user_id = $1 AND ($2::BIGINT IS NULL OR s.study_guide_id = $2)
            GROUP BY s.id, g.title
            ORDER BY s.started_at DESC, s.id DESC
            "#,
        )
        .bind(user_id)
        .bind(guide_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn session_problem_ids(&self, session_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT problem_id FROM problem_attempts WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn user_attempted_problem_ids(&self, user_id: Uuid) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT a.problem_id
            FROM problem_attempts a
            JOIN practice_sessions s ON s.id = a.session_id
            WHERE s.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn record_attempt(
        &self,
        session_id: i64,
        problem_id: i64,
        user_answer: &str,
        is_correct: bool,
        hints_used: i32,
        confidence_rating: Option<i32>,
    ) -> Result<ProblemAttempt> {
        let attempt = sqlx::query_as::<_, ProblemAttempt>(
            r#"
            INSERT INTO problem_attempts
                (session_id, problem_id, user_answer, is_correct, hints_used, confidence_rating)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, session_id, problem_id, user_answer, is_correct, hints_used,
                      confidence_rating, attempted_at
            "#,
        )
        .bind(session_id)
        .bind(problem_id)
        .bind(user_answer)
        .bind(is_correct)
        .bind(hints_used)
        .bind(confidence_rating)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn topic_signals(
        &self,
        user_id: Uuid,
        topic_ids: &[i64],
    ) -> Result<Vec<TopicSignalRow>> {
        let rows = sqlx::query_as::<_, TopicSignalRow>(
            r#"
            SELECT topic_id, current_confidence, last_practiced
            FROM topic_progress
            WHERE user_id = $1 AND topic_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(topic_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_topic_progress(
        &self,
        user_id: Uuid,
        topic_id: i64,
    ) -> Result<Option<TopicProgress>> {
        let query = format!(
            "SELECT {PROGRESS_COLUMNS} FROM topic_progress WHERE user_id = $1 AND topic_id = $2"
        );
        let progress = sqlx::query_as::<_, TopicProgress>(&query)
            .bind(user_id)
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn upsert_topic_progress(
        &self,
        user_id: Uuid,
        topic_id: i64,
        state: &MasteryState,
    ) -> Result<TopicProgress> {
        let query = format!(
            r#"
            INSERT INTO topic_progress
                (user_id, topic_id, current_confidence, problems_attempted, problems_correct,
                 mastered, last_practiced)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id, topic_id) DO UPDATE SET
                current_confidence = EXCLUDED.current_confidence,
                problems_attempted = EXCLUDED.problems_attempted,
                problems_correct = EXCLUDED.problems_correct,
                mastered = EXCLUDED.mastered,
                last_practiced = EXCLUDED.last_practiced
            RETURNING {PROGRESS_COLUMNS}
            "#
        );
        let progress = sqlx::query_as::<_, TopicProgress>(&query)
            .bind(user_id)
            .bind(topic_id)
            .bind(state.current_confidence)
            .bind(state.problems_attempted)
            .bind(state.problems_correct)
            .bind(state.mastered)
            .fetch_one(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn guide_progress(
        &self,
        user_id: Uuid,
        guide_id: i64,
    ) -> Result<Vec<NamedTopicProgress>> {
        let rows = sqlx::query_as::<_, NamedTopicProgress>(
            r#"
            SELECT tp.id, tp.user_id, tp.topic_id, tp.current_confidence, tp.problems_attempted,
                   tp.problems_correct, tp.mastered, tp.last_practiced, t.name AS topic_name
            FROM topic_progress tp
            JOIN topics t ON t.id = tp.topic_id
            WHERE tp.user_id = $1 AND t.study_guide_id = $2
            ORDER BY t.order_index ASC, t.id ASC
            "#,
        )
        .bind(user_id)
        .bind(guide_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn weak_topics(
        &self,
        user_id: Uuid,
        guide_id: Option<i64>,
        threshold: f64,
    ) -> Result<Vec<WeakTopic>> {
        let rows = sqlx::query_as::<_, WeakTopic>(
            r#"
            SELECT tp.topic_id, t.name AS topic_name, t.study_guide_id, tp.current_confidence,
                   tp.problems_attempted, tp.problems_correct, tp.last_practiced
            FROM topic_progress tp
            JOIN topics t ON t.id = tp.topic_id
            WHERE tp.user_id = $1
              AND tp.current_confidence < $2
              AND ($3::BIGINT IS NULL OR t.study_guide_id = $3)
            ORDER BY tp.current_confidence ASC, tp.topic_id ASC
            "#,
        )
        .bind(user_id)
        .bind(threshold)
        .bind(guide_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
