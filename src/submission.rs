// src/submission.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::buffer::AnswerBuffer;
use crate::error::AppError;
use crate::grading;
use crate::models::answer::AnswerPayload;
use crate::models::attempt::{ExamAttempt, FinalizeResult};
use crate::models::result::GradeOutcome;
use crate::store::{AttemptStore, ExamCatalog};

/// Who is driving the finalize, and what they brought with them.
#[derive(Debug, Default)]
pub struct SubmitParams {
    /// Direct answer list from the client. Ignored whenever the buffer holds
    /// anything: the buffer is authoritative over a possibly stale payload.
    pub direct_answers: HashMap<i64, AnswerPayload>,
    /// Client-measured elapsed time, preferred over wall clock.
    pub elapsed_seconds: Option<i64>,
    /// Sweeper mode: an empty answer set grades to zero instead of being
    /// rejected, so abandoned attempts still get closed out.
    pub allow_empty: bool,
}

/// Finalizes one attempt: resolves the answer set, grades it, performs the
/// one legal InProgress → Completed transition together with the graded rows
/// and clears the buffer.
///
/// The conditional update inside `AttemptStore::finalize` decides the race
/// between a user submit and the sweeper; the transition and the answer rows
/// commit in one transaction, and the buffer delete happens only after
/// winning it. The loser performs no writes at all and simply observes
/// `InvalidState`.
pub async fn finalize_attempt(
    store: &dyn AttemptStore,
    catalog: &dyn ExamCatalog,
    buffer: &dyn AnswerBuffer,
    attempt: &ExamAttempt,
    params: SubmitParams,
    now: DateTime<Utc>,
) -> Result<GradeOutcome, AppError> {
    attempt.ensure_in_progress()?;

    let exam = catalog
        .exam(attempt.exam_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", attempt.exam_id)))?;
    let questions = catalog.questions(attempt.exam_id).await?;

    let answers = resolve_answers(buffer, attempt, params.direct_answers).await?;
    if answers.is_empty() && !params.allow_empty {
        return Err(AppError::NothingToGrade);
    }

    let time_spent_seconds = time_spent(attempt, params.elapsed_seconds, now);

    let mut outcome = grading::grade(&exam, &questions, &answers);
    outcome.time_spent_seconds = time_spent_seconds;

    let won = store
        .finalize(
            attempt.id,
            &FinalizeResult {
                score: outcome.score,
                max_score: outcome.max_score,
                submitted_at: now,
                time_spent_seconds,
            },
            &outcome.results,
        )
        .await?;
    if !won {
        return Err(AppError::InvalidState(
            "Attempt was already finalized".to_string(),
        ));
    }

    buffer.delete(attempt.id).await?;

    Ok(outcome)
}

/// Closes out an attempt whose exam definition no longer resolves. Zero
/// score, no answer rows; keeps the sweeper from looping on orphaned data.
pub async fn force_finalize_zero(
    store: &dyn AttemptStore,
    buffer: &dyn AnswerBuffer,
    attempt: &ExamAttempt,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let won = store
        .finalize(
            attempt.id,
            &FinalizeResult {
                score: 0,
                max_score: 0,
                submitted_at: now,
                time_spent_seconds: time_spent(attempt, None, now),
            },
            &[],
        )
        .await?;
    if won {
        buffer.delete(attempt.id).await?;
    }
    Ok(won)
}

/// Buffered answers win over the direct payload: a client that reconnects
/// after saving may submit a stale snapshot, while the buffer holds the last
/// write per question.
async fn resolve_answers(
    buffer: &dyn AnswerBuffer,
    attempt: &ExamAttempt,
    direct: HashMap<i64, AnswerPayload>,
) -> Result<HashMap<i64, AnswerPayload>, AppError> {
    let buffered = buffer.get_all(attempt.id).await?;
    let answers: HashMap<i64, AnswerPayload> = if buffered.is_empty() {
        direct
    } else {
        buffered
            .into_values()
            .map(|a| (a.question_id, a.payload))
            .collect()
    };
    Ok(answers
        .into_iter()
        .filter(|(_, payload)| !payload.is_empty())
        .collect())
}

/// A positive client-reported duration is rounded up to whole minutes with a
/// one-minute floor; otherwise wall clock since the attempt started. The
/// sweeper never supplies a client value, so it always lands on wall clock.
fn time_spent(attempt: &ExamAttempt, elapsed_seconds: Option<i64>, now: DateTime<Utc>) -> i64 {
    match elapsed_seconds {
        Some(seconds) if seconds > 0 => (seconds + 59) / 60 * 60,
        _ => (now - attempt.started_at).num_seconds().max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::InMemoryBuffer;
    use crate::models::answer::BufferedAnswer;
    use crate::models::attempt::AttemptStatus;
    use crate::models::question::{Exam, ExamQuestion, QuestionKind};
    use crate::store::memory::{MemoryAttemptStore, MemoryExamCatalog};
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn fixture_exam() -> Exam {
        Exam {
            id: 1,
            title: "Fixture".to_string(),
            duration_minutes: Some(60),
            total_marks: 10,
            passing_mark: 5,
        }
    }

    fn fixture_questions() -> Vec<ExamQuestion> {
        vec![
            ExamQuestion {
                id: 1,
                exam_id: 1,
                position: 1,
                kind: QuestionKind::Choice,
                marks: 5,
                correct_option_ids: vec![1],
            },
            ExamQuestion {
                id: 2,
                exam_id: 1,
                position: 2,
                kind: QuestionKind::Choice,
                marks: 5,
                correct_option_ids: vec![3, 4],
            },
        ]
    }

    fn catalog() -> MemoryExamCatalog {
        MemoryExamCatalog::new().with_exam(fixture_exam(), fixture_questions())
    }

    async fn started_attempt(store: &MemoryAttemptStore) -> ExamAttempt {
        let attempt = ExamAttempt::start(&fixture_exam(), 7, Utc::now());
        store.create(&attempt).await.unwrap();
        attempt
    }

    fn choice(option_ids: Vec<i64>) -> AnswerPayload {
        AnswerPayload::Choice { option_ids }
    }

    fn buffered(question_id: i64, option_ids: Vec<i64>) -> BufferedAnswer {
        BufferedAnswer {
            question_id,
            payload: choice(option_ids),
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_finalize_observes_invalid_state() {
        let store = MemoryAttemptStore::new();
        let catalog = catalog();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        let params = || SubmitParams {
            direct_answers: HashMap::from([(1, choice(vec![1]))]),
            ..Default::default()
        };

        let outcome =
            finalize_attempt(&store, &catalog, &buffer, &attempt, params(), Utc::now())
                .await
                .unwrap();
        assert_eq!(outcome.score, 5);

        // Second call races against the already-committed transition. The
        // caller still holds the stale InProgress snapshot, like a sweeper
        // that selected the attempt just before the user submitted.
        let err = finalize_attempt(&store, &catalog, &buffer, &attempt, params(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        // Exactly one Completed transition, exactly one set of rows.
        let stored = store.find(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Completed);
        assert_eq!(stored.score, Some(5));
        assert_eq!(store.results(attempt.id).await.len(), 2);
    }

    #[tokio::test]
    async fn buffer_wins_over_stale_direct_payload() {
        let store = MemoryAttemptStore::new();
        let catalog = catalog();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        buffer
            .save(attempt.id, buffered(1, vec![1]), StdDuration::from_secs(600))
            .await
            .unwrap();

        // Direct payload says q1 = {2} (wrong) and answers q2; the buffer
        // holds the authoritative set, so only q1 = {1} is graded.
        let params = SubmitParams {
            direct_answers: HashMap::from([(1, choice(vec![2])), (2, choice(vec![3, 4]))]),
            ..Default::default()
        };
        let outcome = finalize_attempt(&store, &catalog, &buffer, &attempt, params, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.score, 5);

        // Buffer is cleared as part of the same operation.
        assert!(buffer.get_all(attempt.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_payload_used_when_buffer_empty() {
        let store = MemoryAttemptStore::new();
        let catalog = catalog();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        let params = SubmitParams {
            direct_answers: HashMap::from([(1, choice(vec![1])), (2, choice(vec![3, 4]))]),
            ..Default::default()
        };
        let outcome = finalize_attempt(&store, &catalog, &buffer, &attempt, params, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.score, 10);
        assert!(outcome.is_passed);
    }

    #[tokio::test]
    async fn nothing_to_grade_rejected_for_user_path() {
        let store = MemoryAttemptStore::new();
        let catalog = catalog();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        let err = finalize_attempt(
            &store,
            &catalog,
            &buffer,
            &attempt,
            SubmitParams::default(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NothingToGrade));

        // The attempt stays open for a retry or the next sweep.
        let stored = store.find(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn sweeper_mode_grades_empty_set_to_zero() {
        let store = MemoryAttemptStore::new();
        let catalog = catalog();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        let params = SubmitParams {
            allow_empty: true,
            ..Default::default()
        };
        let outcome = finalize_attempt(&store, &catalog, &buffer, &attempt, params, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.max_score, 10);
        assert!(!outcome.is_passed);
    }

    #[tokio::test]
    async fn client_elapsed_preferred_with_minute_floor() {
        let store = MemoryAttemptStore::new();
        let attempt = started_attempt(&store).await;

        // 25 seconds of reported work rounds up to one minute.
        assert_eq!(time_spent(&attempt, Some(25), Utc::now()), 60);
        // 61 seconds rounds up to two minutes; exact minutes pass through.
        assert_eq!(time_spent(&attempt, Some(61), Utc::now()), 120);
        assert_eq!(time_spent(&attempt, Some(120), Utc::now()), 120);
        assert_eq!(time_spent(&attempt, Some(121), Utc::now()), 180);
        // Zero or absent falls back to wall clock.
        let now = attempt.started_at + Duration::seconds(95);
        assert_eq!(time_spent(&attempt, Some(0), now), 95);
        assert_eq!(time_spent(&attempt, None, now), 95);
    }

    #[tokio::test]
    async fn force_finalize_zero_closes_orphans() {
        let store = MemoryAttemptStore::new();
        let buffer = InMemoryBuffer::new();
        let attempt = started_attempt(&store).await;

        assert!(
            force_finalize_zero(&store, &buffer, &attempt, Utc::now())
                .await
                .unwrap()
        );
        let stored = store.find(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Completed);
        assert_eq!(stored.score, Some(0));

        // Already completed: the guard reports the lost race.
        assert!(
            !force_finalize_zero(&store, &buffer, &attempt, Utc::now())
                .await
                .unwrap()
        );
    }
}
