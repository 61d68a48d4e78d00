// src/store/mod.rs

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attempt::{ExamAttempt, FinalizeResult};
use crate::models::question::{Exam, ExamQuestion};
use crate::models::result::QuestionResult;

/// Durable store for attempts and their graded answers. The attempt row is
/// the single source of truth for "is this attempt still open".
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create(&self, attempt: &ExamAttempt) -> Result<(), AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError>;

    /// The open attempt of `user_id` on `exam_id`, if any. At most one exists.
    async fn find_in_progress(
        &self,
        exam_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamAttempt>, AppError>;

    /// Conditional finalize: one transaction that moves the attempt from
    /// InProgress to Completed, writes score/submitted-at/time-spent and
    /// persists the graded per-question rows, guarded by
    /// `status = in_progress`. Returns false (writing nothing) when the row
    /// was already completed, i.e. a concurrent finalize won the race. An
    /// error on any row leaves the attempt InProgress so a retry or the next
    /// sweep can finalize it.
    ///
    /// This is the only write to attempt state anywhere in the engine.
    async fn finalize(
        &self,
        id: Uuid,
        result: &FinalizeResult,
        rows: &[QuestionResult],
    ) -> Result<bool, AppError>;

    /// InProgress attempts whose deadline has elapsed, oldest first.
    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, AppError>;
}

/// Read-only view of the exam/question catalog. Durations, passing marks,
/// correct-option sets and weights all come from here; the attempt engine
/// never writes catalog data.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError>;

    /// The exam's questions in position order.
    async fn questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError>;
}
