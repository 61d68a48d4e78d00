// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attempt::{AttemptStatus, ExamAttempt, FinalizeResult};
use crate::models::question::{Exam, ExamQuestion};
use crate::models::result::QuestionResult;
use crate::store::{AttemptStore, ExamCatalog};

/// In-memory attempt store for tests and local development. Mirrors the
/// Postgres semantics, including the conditional finalize.
#[derive(Default)]
pub struct MemoryAttemptStore {
    attempts: RwLock<HashMap<Uuid, ExamAttempt>>,
    results: RwLock<HashMap<Uuid, Vec<QuestionResult>>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graded rows for an attempt, for assertions in tests.
    pub async fn results(&self, attempt_id: Uuid) -> Vec<QuestionResult> {
        self.results
            .read()
            .await
            .get(&attempt_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn create(&self, attempt: &ExamAttempt) -> Result<(), AppError> {
        self.attempts
            .write()
            .await
            .insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError> {
        Ok(self.attempts.read().await.get(&id).cloned())
    }

    async fn find_in_progress(
        &self,
        exam_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamAttempt>, AppError> {
        Ok(self
            .attempts
            .read()
            .await
            .values()
            .find(|a| {
                a.exam_id == exam_id
                    && a.user_id == user_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn finalize(
        &self,
        id: Uuid,
        result: &FinalizeResult,
        rows: &[QuestionResult],
    ) -> Result<bool, AppError> {
        // Both maps are held for the whole operation, matching the one
        // transaction the Postgres store runs: either the status flips and
        // the rows land, or nothing changes.
        let mut attempts = self.attempts.write().await;
        let mut all_results = self.results.write().await;

        let Some(attempt) = attempts.get_mut(&id) else {
            return Ok(false);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        // Same uniqueness guarantee as the (attempt_id, question_id) key;
        // checked before the status flip so a failure leaves it InProgress.
        if all_results.contains_key(&id) {
            return Err(AppError::InternalServerError(format!(
                "duplicate result rows for attempt {id}"
            )));
        }

        attempt.status = AttemptStatus::Completed;
        attempt.score = Some(result.score);
        attempt.max_score = Some(result.max_score);
        attempt.submitted_at = Some(result.submitted_at);
        attempt.time_spent_seconds = Some(result.time_spent_seconds);
        all_results.insert(id, rows.to_vec());
        Ok(true)
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, AppError> {
        let mut overdue: Vec<ExamAttempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| {
                a.status == AttemptStatus::InProgress
                    && a.deadline.is_some_and(|deadline| deadline <= now)
            })
            .cloned()
            .collect();
        overdue.sort_by_key(|a| a.deadline);
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

/// In-memory catalog, seeded up front.
#[derive(Default)]
pub struct MemoryExamCatalog {
    exams: HashMap<i64, (Exam, Vec<ExamQuestion>)>,
}

impl MemoryExamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exam(mut self, exam: Exam, questions: Vec<ExamQuestion>) -> Self {
        self.exams.insert(exam.id, (exam, questions));
        self
    }
}

#[async_trait]
impl ExamCatalog for MemoryExamCatalog {
    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.exams.get(&exam_id).map(|(exam, _)| exam.clone()))
    }

    async fn questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError> {
        Ok(self
            .exams
            .get(&exam_id)
            .map(|(_, questions)| questions.clone())
            .unwrap_or_default())
    }
}
