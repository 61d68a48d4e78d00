// src/sweeper.rs

use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;
use crate::state::AppState;
use crate::submission::{self, SubmitParams};

/// Long-lived background loop that force-finalizes overdue attempts. This is
/// the only proactive guarantee that a student who abandons a tab still gets
/// a graded, closed-out attempt.
pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs));
    // A long sweep should not cause a burst of catch-up ticks afterwards.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = state.config.sweep_interval_secs,
        batch_size = state.config.sweep_batch_size,
        "Auto-submit sweeper started"
    );

    loop {
        interval.tick().await;
        match sweep_once(&state).await {
            Ok(finalized) if finalized > 0 => {
                tracing::info!(finalized, "Sweep cycle finalized overdue attempts");
            }
            Ok(_) => {}
            Err(e) => {
                // Store outages are retried on the next poll cycle.
                tracing::error!("Sweep cycle failed: {}", e);
            }
        }
    }
}

/// One sweep cycle: selects overdue InProgress attempts oldest-first and
/// drives each through the same finalize path as a user submit, buffer-only.
/// Per-attempt failures never abort the rest of the batch.
pub async fn sweep_once(state: &AppState) -> Result<usize, AppError> {
    // Fresh handles per cycle rather than captures held across the loop.
    let attempts = state.attempts.clone();
    let catalog = state.catalog.clone();
    let buffer = state.buffer.clone();

    let now = Utc::now();
    let overdue = attempts
        .list_overdue(now, state.config.sweep_batch_size)
        .await?;

    let mut finalized = 0;
    for attempt in overdue {
        let result = submission::finalize_attempt(
            attempts.as_ref(),
            catalog.as_ref(),
            buffer.as_ref(),
            &attempt,
            SubmitParams {
                allow_empty: true,
                ..Default::default()
            },
            now,
        )
        .await;

        match result {
            Ok(outcome) => {
                finalized += 1;
                tracing::info!(
                    attempt_id = %attempt.id,
                    exam_id = attempt.exam_id,
                    user_id = attempt.user_id,
                    score = outcome.score,
                    max_score = outcome.max_score,
                    "Auto-submitted overdue attempt"
                );
            }
            // The user submitted first. Correct outcome of the race, not an
            // error to alarm on.
            Err(AppError::InvalidState(_)) => {
                tracing::debug!(attempt_id = %attempt.id, "Attempt finalized concurrently, skipping");
            }
            // Orphaned attempt: its exam no longer resolves. Close it out
            // with zero score rather than selecting it forever.
            Err(AppError::NotFound(msg)) => {
                tracing::warn!(attempt_id = %attempt.id, "Orphaned attempt ({}), forcing zero-score completion", msg);
                match submission::force_finalize_zero(
                    attempts.as_ref(),
                    buffer.as_ref(),
                    &attempt,
                    now,
                )
                .await
                {
                    Ok(true) => finalized += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(attempt_id = %attempt.id, "Failed to force-finalize: {}", e);
                    }
                }
            }
            Err(e) => {
                tracing::error!(attempt_id = %attempt.id, "Failed to auto-submit: {}", e);
            }
        }
    }

    Ok(finalized)
}
