// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'exams' table. Read-only catalog data for this core:
/// the attempt engine never writes exams or questions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,

    /// Exam duration; None means the exam is untimed and attempts never expire.
    pub duration_minutes: Option<i32>,

    /// Denominator for the final score. Unanswered questions count against it.
    pub total_marks: i32,

    pub passing_mark: i32,
}

/// Question kind, mirrors the 'question_kind' Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Choice,
    FreeText,
}

/// One question of one exam, with its mark weight from the ordered
/// exam-question association and the correct-option set used for grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: i64,
    pub exam_id: i64,
    pub position: i32,
    pub kind: QuestionKind,
    pub marks: i32,
    /// Empty for free-text questions.
    pub correct_option_ids: Vec<i64>,
}
