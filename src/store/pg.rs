// src/store/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::answer::AnswerPayload;
use crate::models::attempt::{AttemptStatus, ExamAttempt, FinalizeResult};
use crate::models::question::{Exam, ExamQuestion, QuestionKind};
use crate::models::result::QuestionResult;
use crate::store::{AttemptStore, ExamCatalog};

const ATTEMPT_COLUMNS: &str = "id, exam_id, user_id, started_at, deadline, submitted_at, \
     status, score, max_score, time_spent_seconds";

/// Postgres-backed attempt store.
#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn create(&self, attempt: &ExamAttempt) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO exam_attempts (id, exam_id, user_id, started_at, deadline, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(attempt.id)
        .bind(attempt.exam_id)
        .bind(attempt.user_id)
        .bind(attempt.started_at)
        .bind(attempt.deadline)
        .bind(attempt.status)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert attempt: {:?}", e);
            AppError::from(e)
        })?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ExamAttempt>, AppError> {
        let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn find_in_progress(
        &self,
        exam_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamAttempt>, AppError> {
        let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts
             WHERE exam_id = $1 AND user_id = $2 AND status = $3"
        ))
        .bind(exam_id)
        .bind(user_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn finalize(
        &self,
        id: Uuid,
        result: &FinalizeResult,
        rows: &[QuestionResult],
    ) -> Result<bool, AppError> {
        // Conditional update instead of an in-process lock: the user submit
        // and the sweeper may run in different instances, so the row guard is
        // the one place the race is decided. The status flip and the graded
        // rows commit together; a failed insert rolls the flip back, so the
        // attempt can never end up Completed without its rows.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE exam_attempts
             SET status = $1, score = $2, max_score = $3,
                 submitted_at = $4, time_spent_seconds = $5
             WHERE id = $6 AND status = $7",
        )
        .bind(AttemptStatus::Completed)
        .bind(result.score)
        .bind(result.max_score)
        .bind(result.submitted_at)
        .bind(result.time_spent_seconds)
        .bind(id)
        .bind(AttemptStatus::InProgress)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to finalize attempt {}: {:?}", id, e);
            AppError::from(e)
        })?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        for row in rows {
            let (selected, text) = match &row.submitted {
                AnswerPayload::Choice { option_ids } => (option_ids.clone(), None),
                AnswerPayload::Text { text } => (vec![], Some(text.clone())),
                AnswerPayload::Empty => (vec![], None),
            };

            sqlx::query(
                "INSERT INTO submitted_answers
                     (attempt_id, question_id, marks_earned, max_marks, is_correct,
                      pending_review, selected_option_ids, answer_text)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(row.question_id)
            .bind(row.marks_earned)
            .bind(row.max_marks)
            .bind(row.is_correct)
            .bind(row.pending_review)
            .bind(Json(selected))
            .bind(text)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert answer row for {}: {:?}", id, e);
                AppError::from(e)
            })?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_overdue(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, AppError> {
        let attempts = sqlx::query_as::<_, ExamAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts
             WHERE status = $1 AND deadline IS NOT NULL AND deadline <= $2
             ORDER BY deadline ASC
             LIMIT $3"
        ))
        .bind(AttemptStatus::InProgress)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }
}

/// Postgres-backed catalog reader.
#[derive(Clone)]
pub struct PgExamCatalog {
    pool: PgPool,
}

impl PgExamCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape for exam_questions before the correct-option sets are attached.
#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    exam_id: i64,
    position: i32,
    kind: QuestionKind,
    marks: i32,
}

#[derive(sqlx::FromRow)]
struct CorrectOptionRow {
    question_id: i64,
    id: i64,
}

#[async_trait]
impl ExamCatalog for PgExamCatalog {
    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        let exam = sqlx::query_as::<_, Exam>(
            "SELECT id, title, duration_minutes, total_marks, passing_mark
             FROM exams WHERE id = $1",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exam)
    }

    async fn questions(&self, exam_id: i64) -> Result<Vec<ExamQuestion>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, exam_id, position, kind, marks
             FROM exam_questions WHERE exam_id = $1
             ORDER BY position ASC",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let options = sqlx::query_as::<_, CorrectOptionRow>(
            "SELECT question_id, id FROM question_options
             WHERE is_correct AND question_id = ANY($1)",
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut questions: Vec<ExamQuestion> = rows
            .into_iter()
            .map(|row| ExamQuestion {
                id: row.id,
                exam_id: row.exam_id,
                position: row.position,
                kind: row.kind,
                marks: row.marks,
                correct_option_ids: vec![],
            })
            .collect();

        for option in options {
            if let Some(question) = questions.iter_mut().find(|q| q.id == option.question_id) {
                question.correct_option_ids.push(option.id);
            }
        }

        Ok(questions)
    }
}
