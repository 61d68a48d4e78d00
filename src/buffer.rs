// src/buffer.rs

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::answer::BufferedAnswer;

/// Minimum effective TTL. A deadline already in the past must still leave the
/// buffer readable long enough for the sweeper or a retrying client.
pub const MIN_TTL: Duration = Duration::from_secs(60);

/// Computes the buffer TTL for a save: the buffer must outlive the exam
/// window by `grace_minutes` so a disconnected client can replay, but is
/// reclaimed automatically if nobody ever finalizes the attempt.
///
/// Untimed attempts fall back to `default_minutes`.
pub fn ttl_for(
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace_minutes: i64,
    default_minutes: i64,
) -> Duration {
    let seconds = match deadline {
        Some(deadline) => (deadline - now).num_seconds() + grace_minutes * 60,
        None => default_minutes * 60,
    };
    Duration::from_secs(seconds.max(0) as u64).max(MIN_TTL)
}

/// Low-durability store of in-progress answers: one hash of question ID to
/// answer per attempt, with a whole-map expiry reset on every save.
///
/// No grading logic lives here; once an attempt is finalized the map is
/// deleted as part of the same operation and never read again.
#[async_trait]
pub trait AnswerBuffer: Send + Sync {
    /// Upserts one answer and resets the map's expiry to `ttl` from now.
    /// Idempotent per question ID; last write wins.
    async fn save(
        &self,
        attempt_id: Uuid,
        answer: BufferedAnswer,
        ttl: Duration,
    ) -> Result<(), AppError>;

    /// Same as `save` for several answers in one logical operation.
    async fn save_batch(
        &self,
        attempt_id: Uuid,
        answers: Vec<BufferedAnswer>,
        ttl: Duration,
    ) -> Result<(), AppError>;

    /// Full question-ID → answer map; empty if absent or expired.
    async fn get_all(&self, attempt_id: Uuid) -> Result<HashMap<i64, BufferedAnswer>, AppError>;

    async fn exists(&self, attempt_id: Uuid) -> Result<bool, AppError>;

    async fn delete(&self, attempt_id: Uuid) -> Result<(), AppError>;
}

struct Entry {
    answers: HashMap<i64, BufferedAnswer>,
    expires_at: Instant,
}

/// In-process TTL hash map backing `AnswerBuffer`. Expired entries are
/// dropped lazily on the next touch of the map, which bounds growth without
/// a background reaper.
#[derive(Default)]
pub struct InMemoryBuffer {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnswerBuffer for InMemoryBuffer {
    async fn save(
        &self,
        attempt_id: Uuid,
        answer: BufferedAnswer,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.save_batch(attempt_id, vec![answer], ttl).await
    }

    async fn save_batch(
        &self,
        attempt_id: Uuid,
        answers: Vec<BufferedAnswer>,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);

        let entry = entries.entry(attempt_id).or_insert_with(|| Entry {
            answers: HashMap::new(),
            expires_at: now + ttl,
        });
        for answer in answers {
            entry.answers.insert(answer.question_id, answer);
        }
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn get_all(&self, attempt_id: Uuid) -> Result<HashMap<i64, BufferedAnswer>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&attempt_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.answers.clone())
            .unwrap_or_default())
    }

    async fn exists(&self, attempt_id: Uuid) -> Result<bool, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&attempt_id)
            .is_some_and(|entry| entry.expires_at > Instant::now()))
    }

    async fn delete(&self, attempt_id: Uuid) -> Result<(), AppError> {
        self.entries.write().await.remove(&attempt_id);
        Ok(())
    }
}
