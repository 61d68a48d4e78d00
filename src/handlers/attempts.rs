// src/handlers/attempts.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    buffer,
    error::AppError,
    models::{
        answer::{AnswerPayload, BufferedAnswer, SaveAnswerRequest, SaveBatchRequest, SubmitRequest},
        attempt::ExamAttempt,
    },
    state::AppState,
    submission::{self, SubmitParams},
    utils::jwt::Claims,
};

/// Loads an attempt and checks the caller owns it. Shared by every
/// attempt-scoped handler.
async fn load_owned_attempt(
    state: &AppState,
    attempt_id: Uuid,
    claims: &Claims,
) -> Result<ExamAttempt, AppError> {
    let attempt = state
        .attempts
        .find(attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
    attempt.ensure_owned_by(claims.user_id()?)?;
    Ok(attempt)
}

/// Starts a new attempt on an exam.
///
/// Enrollment/payment checks happen upstream; here the exam must exist and
/// the caller must not already have an open attempt on it. The deadline is
/// fixed at creation from the exam's duration and never moves.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let exam = state
        .catalog
        .exam(exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    if let Some(open) = state.attempts.find_in_progress(exam_id, user_id).await? {
        return Err(AppError::InvalidState(format!(
            "Attempt {} is still in progress",
            open.id
        )));
    }

    let attempt = ExamAttempt::start(&exam, user_id, Utc::now());
    state.attempts.create(&attempt).await?;

    tracing::info!(
        attempt_id = %attempt.id,
        exam_id,
        user_id,
        "Attempt started"
    );

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Fetches one attempt for the owner (result review once completed).
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = load_owned_attempt(&state, attempt_id, &claims).await?;
    Ok(Json(attempt))
}

/// Saves one in-progress answer into the buffer. Low latency, best-effort
/// durability: the durable graded record is only written at finalize.
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    let attempt = load_owned_attempt(&state, attempt_id, &claims).await?;
    attempt.ensure_open(now)?;

    let ttl = ttl_for_attempt(&state, &attempt, req.buffer_minutes, now);
    state
        .buffer
        .save(
            attempt.id,
            BufferedAnswer {
                question_id: req.question_id,
                payload: req.payload,
                saved_at: now,
            },
            ttl,
        )
        .await?;

    Ok(Json(serde_json::json!({ "saved": 1, "saved_at": now })))
}

/// Saves several answers in one call, one buffer round trip.
pub async fn save_batch(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SaveBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    let attempt = load_owned_attempt(&state, attempt_id, &claims).await?;
    attempt.ensure_open(now)?;

    let count = req.answers.len();
    let answers = req
        .answers
        .into_iter()
        .map(|item| BufferedAnswer {
            question_id: item.question_id,
            payload: item.payload,
            saved_at: now,
        })
        .collect();

    let ttl = ttl_for_attempt(&state, &attempt, req.buffer_minutes, now);
    state.buffer.save_batch(attempt.id, answers, ttl).await?;

    Ok(Json(serde_json::json!({ "saved": count, "saved_at": now })))
}

/// Returns all buffered answers for restore-on-reload, ordered by question.
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = load_owned_attempt(&state, attempt_id, &claims).await?;
    attempt.ensure_open(Utc::now())?;

    let mut answers: Vec<BufferedAnswer> =
        state.buffer.get_all(attempt.id).await?.into_values().collect();
    answers.sort_by_key(|a| a.question_id);

    Ok(Json(answers))
}

/// Finalizes the attempt on the user's request. Buffered answers win over
/// the request body; the sweeper races this through the same path.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    let attempt = load_owned_attempt(&state, attempt_id, &claims).await?;

    let direct_answers: HashMap<i64, AnswerPayload> = req
        .answers
        .into_iter()
        .map(|item| (item.question_id, item.payload))
        .collect();

    let outcome = submission::finalize_attempt(
        state.attempts.as_ref(),
        state.catalog.as_ref(),
        state.buffer.as_ref(),
        &attempt,
        SubmitParams {
            direct_answers,
            elapsed_seconds: req.elapsed_seconds,
            allow_empty: false,
        },
        now,
    )
    .await?;

    tracing::info!(
        attempt_id = %attempt.id,
        score = outcome.score,
        max_score = outcome.max_score,
        is_passed = outcome.is_passed,
        "Attempt submitted"
    );

    Ok(Json(outcome))
}

/// TTL for a save: deadline plus grace when timed, configured default when
/// not. The caller-supplied grace is capped to keep abandoned buffers bounded.
fn ttl_for_attempt(
    state: &AppState,
    attempt: &ExamAttempt,
    buffer_minutes: Option<i64>,
    now: chrono::DateTime<Utc>,
) -> std::time::Duration {
    let grace = buffer_minutes
        .unwrap_or(state.config.buffer_grace_minutes)
        .min(state.config.buffer_grace_cap_minutes);
    buffer::ttl_for(
        attempt.deadline,
        now,
        grace,
        state.config.buffer_default_ttl_minutes,
    )
}
