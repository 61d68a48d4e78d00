// src/models/result.rs

use serde::{Deserialize, Serialize};

use crate::models::answer::AnswerPayload;

/// The graded record of one question's final answer. Produced exactly once
/// per (attempt, question) by the submission path and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub marks_earned: i32,
    pub max_marks: i32,
    pub is_correct: bool,
    /// Free-text answers are auto-credited but flagged for a manual pass.
    pub pending_review: bool,
    /// Echo of what was submitted, for review screens.
    pub submitted: AnswerPayload,
    /// The correct option set, for review. Empty for free-text questions.
    pub correct_option_ids: Vec<i64>,
}

/// Output of the grading algorithm, returned to submit callers and used to
/// finalize the attempt row.
#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub time_spent_seconds: i64,
    pub results: Vec<QuestionResult>,
}
