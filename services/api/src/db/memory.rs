//! In-process adapter with the same row semantics as the PostgreSQL schema,
//! including cascading deletes.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use studyguide_core::confidence::MasteryState;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NamedTopicProgress, PracticeStore};
use crate::models::{
    NewProblem, PracticeSession, Problem, ProblemAttempt, SessionHistoryEntry, SessionSummary,
    SessionType, StudyGuide, Topic, TopicProgress, TopicSignalRow, WeakTopic, accuracy_percent,
};

#[derive(Default)]
struct Tables {
    last_id: i64,
    guides: BTreeMap<i64, StudyGuide>,
    topics: BTreeMap<i64, Topic>,
    problems: BTreeMap<i64, Problem>,
    sessions: BTreeMap<i64, PracticeSession>,
    attempts: BTreeMap<i64, ProblemAttempt>,
    progress: BTreeMap<(Uuid, i64), TopicProgress>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn remove_problems(&mut self, problem_ids: &HashSet<i64>) {
        self.problems.retain(|id, _| !problem_ids.contains(id));
        self.attempts
            .retain(|_, attempt| !problem_ids.contains(&attempt.problem_id));
    }

    fn remove_topics(&mut self, topic_ids: &HashSet<i64>) {
        self.topics.retain(|id, _| !topic_ids.contains(id));
        let problem_ids: HashSet<i64> = self
            .problems
            .values()
            .filter(|problem| topic_ids.contains(&problem.topic_id))
            .map(|problem| problem.id)
            .collect();
        self.remove_problems(&problem_ids);
        self.progress
            .retain(|(_, topic_id), _| !topic_ids.contains(topic_id));
    }

    fn topics_in_order(&self, guide_id: i64) -> Vec<&Topic> {
        let mut topics: Vec<&Topic> = self
            .topics
            .values()
            .filter(|topic| topic.study_guide_id == guide_id)
            .collect();
        topics.sort_by_key(|topic| (topic.order_index, topic.id));
        topics
    }
}

/// Keeps every table in memory behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PracticeStore for MemoryStore {
    async fn create_study_guide(
        &self,
        user_id: Uuid,
        title: &str,
        original_filename: Option<&str>,
    ) -> Result<StudyGuide> {
        let mut tables = self.tables.lock().await;
        let guide = StudyGuide {
            id: tables.next_id(),
            user_id,
            title: title.to_string(),
            original_filename: original_filename.map(str::to_string),
            created_at: Utc::now(),
        };
        tables.guides.insert(guide.id, guide.clone());
        Ok(guide)
    }

    async fn get_study_guide(&self, guide_id: i64) -> Result<Option<StudyGuide>> {
        Ok(self.tables.lock().await.guides.get(&guide_id).cloned())
    }

    async fn list_study_guides(&self, user_id: Uuid) -> Result<Vec<StudyGuide>> {
        let tables = self.tables.lock().await;
        let mut guides: Vec<StudyGuide> = tables
            .guides
            .values()
            .filter(|guide| guide.user_id == user_id)
            .cloned()
            .collect();
        guides.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(guides)
    }

    async fn update_study_guide(
        &self,
        guide_id: i64,
        title: Option<&str>,
        original_filename: Option<&str>,
    ) -> Result<Option<StudyGuide>> {
        let mut tables = self.tables.lock().await;
        let Some(guide) = tables.guides.get_mut(&guide_id) else {
            return Ok(None);
        };
        if let Some(title) = title {
            guide.title = title.to_string();
        }
        if let Some(filename) = original_filename {
            guide.original_filename = Some(filename.to_string());
        }
        Ok(Some(guide.clone()))
    }

    async fn delete_study_guide(&self, guide_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.guides.remove(&guide_id).is_none() {
            return Ok(false);
        }
        let topic_ids: HashSet<i64> = tables
            .topics
            .values()
            .filter(|topic| topic.study_guide_id == guide_id)
            .map(|topic| topic.id)
            .collect();
        tables.remove_topics(&topic_ids);

        let session_ids: HashSet<i64> = tables
            .sessions
            .values()
            .filter(|session| session.study_guide_id == guide_id)
            .map(|session| session.id)
            .collect();
        tables.sessions.retain(|id, _| !session_ids.contains(id));
        tables
            .attempts
            .retain(|_, attempt| !session_ids.contains(&attempt.session_id));
        Ok(true)
    }

    async fn create_topic(
        &self,
        guide_id: i64,
        name: &str,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Topic> {
        let mut tables = self.tables.lock().await;
        if !tables.guides.contains_key(&guide_id) {
            bail!("study guide {guide_id} does not exist");
        }
        let order_index = order_index.unwrap_or_else(|| {
            tables
                .topics_in_order(guide_id)
                .iter()
                .map(|topic| topic.order_index)
                .max()
                .unwrap_or(0)
                + 1
        });
        let topic = Topic {
            id: tables.next_id(),
            study_guide_id: guide_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            order_index,
        };
        tables.topics.insert(topic.id, topic.clone());
        Ok(topic)
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>> {
        Ok(self.tables.lock().await.topics.get(&topic_id).cloned())
    }

    async fn list_topics_for_guide(&self, guide_id: i64) -> Result<Vec<Topic>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .topics_in_order(guide_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn update_topic(
        &self,
        topic_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        order_index: Option<i32>,
    ) -> Result<Option<Topic>> {
        let mut tables = self.tables.lock().await;
        let Some(topic) = tables.topics.get_mut(&topic_id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            topic.name = name.to_string();
        }
        if let Some(description) = description {
            topic.description = Some(description.to_string());
        }
        if let Some(order_index) = order_index {
            topic.order_index = order_index;
        }
        Ok(Some(topic.clone()))
    }

    async fn delete_topic(&self, topic_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.topics.contains_key(&topic_id) {
            return Ok(false);
        }
        tables.remove_topics(&HashSet::from([topic_id]));
        Ok(true)
    }

    async fn create_problems(&self, topic_id: i64, problems: &[NewProblem]) -> Result<Vec<Problem>> {
        let mut tables = self.tables.lock().await;
        if !tables.topics.contains_key(&topic_id) {
            bail!("topic {topic_id} does not exist");
        }
        let now = Utc::now();
        let mut created = Vec::with_capacity(problems.len());
        for problem in problems {
            let row = Problem {
                id: tables.next_id(),
                topic_id,
                question_text: problem.question_text.clone(),
                problem_type: problem.problem_type,
                options: problem.options.clone(),
                correct_answer: problem.correct_answer.clone(),
                explanation: problem.explanation.clone(),
                hints: problem.hints.clone(),
                hint_penalty: problem.hint_penalty,
                created_at: now,
            };
            tables.problems.insert(row.id, row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn get_problem(&self, problem_id: i64) -> Result<Option<Problem>> {
        Ok(self.tables.lock().await.problems.get(&problem_id).cloned())
    }

    async fn list_candidate_problems(
        &self,
        topic_id: i64,
        excluded: &[i64],
    ) -> Result<Vec<Problem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .problems
            .values()
            .filter(|problem| problem.topic_id == topic_id && !excluded.contains(&problem.id))
            .cloned()
            .collect())
    }

    async fn count_guide_problems(&self, guide_id: i64) -> Result<i64> {
        let tables = self.tables.lock().await;
        let count = tables
            .problems
            .values()
            .filter(|problem| {
                tables
                    .topics
                    .get(&problem.topic_id)
                    .is_some_and(|topic| topic.study_guide_id == guide_id)
            })
            .count();
        Ok(count as i64)
    }

    async fn delete_problem(&self, problem_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.problems.contains_key(&problem_id) {
            return Ok(false);
        }
        tables.remove_problems(&HashSet::from([problem_id]));
        Ok(true)
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        guide_id: i64,
        session_type: SessionType,
        questions_count: Option<i32>,
        time_limit_minutes: Option<i32>,
    ) -> Result<PracticeSession> {
        let mut tables = self.tables.lock().await;
        if !tables.guides.contains_key(&guide_id) {
            bail!("study guide {guide_id} does not exist");
        }
        let session = PracticeSession {
            id: tables.next_id(),
            user_id,
            study_guide_id: guide_id,
            session_type,
            questions_count,
            time_limit_minutes,
            is_timed: session_type == SessionType::ExamMode,
            started_at: Utc::now(),
            ended_at: None,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<PracticeSession>> {
        Ok(self.tables.lock().await.sessions.get(&session_id).cloned())
    }

    async fn end_session(&self, session_id: i64) -> Result<Option<SessionSummary>> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables
            .sessions
            .get_mut(&session_id)
            .filter(|session| session.ended_at.is_none())
        else {
            return Ok(None);
        };
        let ended_at = Utc::now();
        session.ended_at = Some(ended_at);

        let (total, correct) = tables
            .attempts
            .values()
            .filter(|attempt| attempt.session_id == session_id)
            .fold((0, 0), |(total, correct), attempt| {
                (total + 1, correct + i64::from(attempt.is_correct))
            });
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
        let tables = self.tables.lock().await;
        let mut entries: Vec<SessionHistoryEntry> = tables
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .filter(|session| guide_id.is_none_or(|id| session.study_guide_id == id))
            .filter_map(|session| {
                let guide = tables.guides.get(&session.study_guide_id)?;
                let attempt_count = tables
                    .attempts
                    .values()
                    .filter(|attempt| attempt.session_id == session.id)
                    .count() as i64;
                Some(SessionHistoryEntry {
                    session: session.clone(),
                    study_guide_title: guide.title.clone(),
                    attempt_count,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.session
                .started_at
                .cmp(&a.session.started_at)
                .then(b.session.id.cmp(&a.session.id))
        });
        Ok(entries)
    }

    async fn session_problem_ids(&self, session_id: i64) -> Result<Vec<i64>> {
        let tables = self.tables.lock().await;
        let ids: HashSet<i64> = tables
            .attempts
            .values()
            .filter(|attempt| attempt.session_id == session_id)
            .map(|attempt| attempt.problem_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn user_attempted_problem_ids(&self, user_id: Uuid) -> Result<Vec<i64>> {
        let tables = self.tables.lock().await;
        let ids: HashSet<i64> = tables
            .attempts
            .values()
            .filter(|attempt| {
                tables
                    .sessions
                    .get(&attempt.session_id)
                    .is_some_and(|session| session.user_id == user_id)
            })
            .map(|attempt| attempt.problem_id)
            .collect();
        Ok(ids.into_iter().collect())
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
        let mut tables = self.tables.lock().await;
        if !tables.sessions.contains_key(&session_id) || !tables.problems.contains_key(&problem_id)
        {
            bail!("attempt references a missing session or problem");
        }
        let attempt = ProblemAttempt {
            id: tables.next_id(),
            session_id,
            problem_id,
            user_answer: user_answer.to_string(),
            is_correct,
            hints_used,
            confidence_rating,
            attempted_at: Utc::now(),
        };
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn topic_signals(
        &self,
        user_id: Uuid,
        topic_ids: &[i64],
    ) -> Result<Vec<TopicSignalRow>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .progress
            .values()
            .filter(|row| row.user_id == user_id && topic_ids.contains(&row.topic_id))
            .map(|row| TopicSignalRow {
                topic_id: row.topic_id,
                current_confidence: row.current_confidence,
                last_practiced: row.last_practiced,
            })
            .collect())
    }

    async fn get_topic_progress(
        &self,
        user_id: Uuid,
        topic_id: i64,
    ) -> Result<Option<TopicProgress>> {
        let tables = self.tables.lock().await;
        Ok(tables.progress.get(&(user_id, topic_id)).cloned())
    }

    async fn upsert_topic_progress(
        &self,
        user_id: Uuid,
        topic_id: i64,
        state: &MasteryState,
    ) -> Result<TopicProgress> {
        let mut tables = self.tables.lock().await;
        if !tables.topics.contains_key(&topic_id) {
            bail!("topic {topic_id} does not exist");
        }
        let id = match tables.progress.get(&(user_id, topic_id)) {
            Some(existing) => existing.id,
            None => tables.next_id(),
        };
        let row = TopicProgress {
            id,
            user_id,
            topic_id,
            current_confidence: state.current_confidence,
            problems_attempted: state.problems_attempted,
            problems_correct: state.problems_correct,
            mastered: state.mastered,
            last_practiced: Some(Utc::now()),
        };
        tables.progress.insert((user_id, topic_id), row.clone());
        Ok(row)
    }

    async fn guide_progress(
        &self,
        user_id: Uuid,
        guide_id: i64,
    ) -> Result<Vec<NamedTopicProgress>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .topics_in_order(guide_id)
            .into_iter()
            .filter_map(|topic| {
                let progress = tables.progress.get(&(user_id, topic.id))?;
                Some(NamedTopicProgress {
                    progress: progress.clone(),
                    topic_name: topic.name.clone(),
                })
            })
            .collect())
    }

    async fn weak_topics(
        &self,
        user_id: Uuid,
        guide_id: Option<i64>,
        threshold: f64,
    ) -> Result<Vec<WeakTopic>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<WeakTopic> = tables
            .progress
            .values()
            .filter(|row| row.user_id == user_id && row.current_confidence < threshold)
            .filter_map(|row| {
                let topic = tables.topics.get(&row.topic_id)?;
                if guide_id.is_some_and(|id| topic.study_guide_id != id) {
                    return None;
                }
                Some(WeakTopic {
                    topic_id: row.topic_id,
                    topic_name: topic.name.clone(),
                    study_guide_id: topic.study_guide_id,
                    current_confidence: row.current_confidence,
                    problems_attempted: row.problems_attempted,
                    problems_correct: row.problems_correct,
                    last_practiced: row.last_practiced,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.current_confidence
                .total_cmp(&b.current_confidence)
                .then(a.topic_id.cmp(&b.topic_id))
        });
        Ok(rows)
    }
}
