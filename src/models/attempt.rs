// src/models/attempt.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::question::Exam;

/// Attempt status, mirrors the 'attempt_status' Postgres enum.
///
/// There is deliberately no stored Expired state: expiry is a predicate over
/// deadline and the clock while the row is still InProgress, so the sweeper
/// and a late user click can never observe two different committed states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

/// Represents the 'exam_attempts' table: one student's instance of taking
/// one exam. Created by start-exam, mutated only by the finalize path,
/// never deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub exam_id: i64,
    pub user_id: i64,

    pub started_at: DateTime<Utc>,
    /// started_at + exam duration; None for untimed exams.
    pub deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,

    pub status: AttemptStatus,

    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub time_spent_seconds: Option<i64>,
}

impl ExamAttempt {
    /// Builds a fresh InProgress attempt for `exam`, computing the deadline
    /// from the exam's duration.
    pub fn start(exam: &Exam, user_id: i64, now: DateTime<Utc>) -> Self {
        let deadline = exam
            .duration_minutes
            .map(|m| now + Duration::minutes(i64::from(m)));
        Self {
            id: Uuid::new_v4(),
            exam_id: exam.id,
            user_id,
            started_at: now,
            deadline,
            submitted_at: None,
            status: AttemptStatus::InProgress,
            score: None,
            max_score: None,
            time_spent_seconds: None,
        }
    }

    /// Expiry is derived, not stored: InProgress with a deadline in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::InProgress
            && self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// Guard for save-answer and progress reads: the attempt must still be
    /// open and inside its time window. Submit uses only the status check,
    /// since an expired-but-InProgress attempt is exactly what a late click
    /// or the sweeper is supposed to finalize.
    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        self.ensure_in_progress()?;
        if self.is_expired(now) {
            return Err(AppError::InvalidState(
                "Attempt deadline has passed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_in_progress(&self) -> Result<(), AppError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AppError::InvalidState(
                "Attempt is already completed".to_string(),
            ));
        }
        Ok(())
    }

    /// Ownership guard for user-initiated operations.
    pub fn ensure_owned_by(&self, user_id: i64) -> Result<(), AppError> {
        if self.user_id != user_id {
            return Err(AppError::Unauthorized(
                "Attempt belongs to another user".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values written exactly once by the conditional finalize update.
#[derive(Debug, Clone)]
pub struct FinalizeResult {
    pub score: i32,
    pub max_score: i32,
    pub submitted_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
}
