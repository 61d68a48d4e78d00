// src/models/answer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One question's answer, tagged by kind so the grader can match exhaustively
/// instead of probing nullable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    /// Selected option IDs for a choice question.
    Choice { option_ids: Vec<i64> },
    /// Free-text answer for a text question.
    Text { text: String },
    /// Explicitly cleared / never answered.
    Empty,
}

impl AnswerPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerPayload::Choice { option_ids } => option_ids.is_empty(),
            AnswerPayload::Text { text } => text.trim().is_empty(),
            AnswerPayload::Empty => true,
        }
    }
}

/// One buffered in-progress answer, held in the answer buffer keyed by
/// attempt ID and question ID. Last write wins per question ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedAnswer {
    pub question_id: i64,
    pub payload: AnswerPayload,
    pub saved_at: DateTime<Utc>,
}

/// DTO for saving a single answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub payload: AnswerPayload,
    /// Optional override for how long the buffer outlives the deadline.
    #[validate(range(min = 1))]
    pub buffer_minutes: Option<i64>,
}

/// DTO for saving several answers in one call.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveBatchRequest {
    #[validate(length(min = 1, max = 200))]
    pub answers: Vec<SaveAnswerItem>,
    #[validate(range(min = 1))]
    pub buffer_minutes: Option<i64>,
}

// Serialize is required by the length validation on `SaveBatchRequest.answers`,
// which embeds the offending value in the error params.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveAnswerItem {
    pub question_id: i64,
    pub payload: AnswerPayload,
}

/// DTO for submitting an attempt. Buffered answers take precedence over
/// `answers` when both are present.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: Vec<SaveAnswerItem>,
    /// Client-measured elapsed time; preferred over wall clock because a
    /// suspended tab would otherwise inflate the wall-clock figure.
    #[validate(range(min = 0))]
    pub elapsed_seconds: Option<i64>,
}
