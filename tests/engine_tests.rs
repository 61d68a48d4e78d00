// tests/engine_tests.rs
//
// End-to-end tests driving the router in-process over the in-memory stores,
// so no database or network is needed.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use chrono::{Duration, Utc};

use exam_engine::buffer::InMemoryBuffer;
use exam_engine::config::Config;
use exam_engine::models::attempt::ExamAttempt;
use exam_engine::models::question::{Exam, ExamQuestion, QuestionKind};
use exam_engine::routes::create_router;
use exam_engine::state::AppState;
use exam_engine::store::AttemptStore;
use exam_engine::store::memory::{MemoryAttemptStore, MemoryExamCatalog};
use exam_engine::utils::jwt::sign_jwt;

const JWT_SECRET: &str = "test_secret_for_integration_tests";

struct TestCtx {
    app: Router,
    store: Arc<MemoryAttemptStore>,
}

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        sweep_interval_secs: 30,
        sweep_batch_size: 100,
        buffer_default_ttl_minutes: 180,
        buffer_grace_minutes: 10,
        buffer_grace_cap_minutes: 24 * 60,
    }
}

/// Exam 1: two choice questions worth 5 each, correct sets {1} and {3,4}.
/// Exam 2: untimed, one free-text question worth 10.
fn seeded_catalog() -> MemoryExamCatalog {
    MemoryExamCatalog::new()
        .with_exam(
            Exam {
                id: 1,
                title: "Timed exam".to_string(),
                duration_minutes: Some(60),
                total_marks: 10,
                passing_mark: 5,
            },
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
            ],
        )
        .with_exam(
            Exam {
                id: 2,
                title: "Untimed essay".to_string(),
                duration_minutes: None,
                total_marks: 10,
                passing_mark: 6,
            },
            vec![ExamQuestion {
                id: 10,
                exam_id: 2,
                position: 1,
                kind: QuestionKind::FreeText,
                marks: 10,
                correct_option_ids: vec![],
            }],
        )
}

fn setup() -> TestCtx {
    let store = Arc::new(MemoryAttemptStore::new());
    let state = AppState {
        attempts: store.clone(),
        catalog: Arc::new(seeded_catalog()),
        buffer: Arc::new(InMemoryBuffer::new()),
        config: test_config(),
    };
    TestCtx {
        app: create_router(state),
        store,
    }
}

fn bearer(user_id: i64) -> String {
    let token = sign_jwt(user_id, "student", JWT_SECRET, 600).expect("sign test token");
    format!("Bearer {token}")
}

fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn start_attempt(ctx: &TestCtx, exam_id: i64, token: &str) -> serde_json::Value {
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/exams/{exam_id}/attempts"),
            Some(token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn full_attempt_flow_save_progress_submit() {
    let ctx = setup();
    let token = bearer(7);

    let attempt = start_attempt(&ctx, 1, &token).await;
    let attempt_id = attempt["id"].as_str().unwrap().to_string();
    assert_eq!(attempt["status"], "in_progress");
    assert!(attempt["deadline"].is_string());

    // Save q1, then batch-save q1 (overwrite) + q2.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/answers"),
            Some(&token),
            Some(serde_json::json!({
                "question_id": 1,
                "payload": { "kind": "choice", "option_ids": [2] }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/answers/batch"),
            Some(&token),
            Some(serde_json::json!({
                "answers": [
                    { "question_id": 1, "payload": { "kind": "choice", "option_ids": [1] } },
                    { "question_id": 2, "payload": { "kind": "choice", "option_ids": [3] } }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["saved"], 2);

    // Restore-on-reload sees the last write per question.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/attempts/{attempt_id}/progress"),
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let progress = read_json(response).await;
    let entries = progress.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["payload"]["option_ids"], serde_json::json!([1]));

    // Submit with a stale direct payload: the buffer wins, so q1={1} (right)
    // and q2={3} (wrong against {3,4}) grade to 5/10.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({
                "answers": [
                    { "question_id": 1, "payload": { "kind": "choice", "option_ids": [2] } }
                ],
                "elapsed_seconds": 90
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = read_json(response).await;
    assert_eq!(outcome["score"], 5);
    assert_eq!(outcome["max_score"], 10);
    assert_eq!(outcome["percentage"], 50.0);
    assert_eq!(outcome["is_passed"], true);
    // 90 client seconds round up to two whole minutes.
    assert_eq!(outcome["time_spent_seconds"], 120);

    // Exactly one set of graded rows.
    let rows = ctx
        .store
        .results(attempt_id.parse().unwrap())
        .await;
    assert_eq!(rows.len(), 2);

    // Second submit observes the completed state.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // So does a late save.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/answers"),
            Some(&token),
            Some(serde_json::json!({
                "question_id": 1,
                "payload": { "kind": "choice", "option_ids": [1] }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn submit_direct_answers_without_buffer() {
    let ctx = setup();
    let token = bearer(3);

    let attempt = start_attempt(&ctx, 1, &token).await;
    let attempt_id = attempt["id"].as_str().unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({
                "answers": [
                    { "question_id": 1, "payload": { "kind": "choice", "option_ids": [1] } },
                    { "question_id": 2, "payload": { "kind": "choice", "option_ids": [4, 3] } }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = read_json(response).await;
    assert_eq!(outcome["score"], 10);
    assert_eq!(outcome["is_passed"], true);
}

#[tokio::test]
async fn submit_with_nothing_to_grade_is_rejected() {
    let ctx = setup();
    let token = bearer(4);

    let attempt = start_attempt(&ctx, 1, &token).await;
    let attempt_id = attempt["id"].as_str().unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The attempt stays open for retry or the sweep.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/attempts/{attempt_id}"),
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body["status"], "in_progress");
}

#[tokio::test]
async fn free_text_answer_is_credited_and_flagged() {
    let ctx = setup();
    let token = bearer(5);

    let attempt = start_attempt(&ctx, 2, &token).await;
    let attempt_id = attempt["id"].as_str().unwrap();
    // Untimed exam: no deadline.
    assert!(attempt["deadline"].is_null());

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({
                "answers": [
                    { "question_id": 10, "payload": { "kind": "text", "text": "An essay." } }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = read_json(response).await;
    assert_eq!(outcome["score"], 10);
    assert_eq!(outcome["results"][0]["pending_review"], true);
}

#[tokio::test]
async fn expired_attempt_rejects_saves_and_progress_but_allows_submit() {
    let ctx = setup();
    let token = bearer(11);

    // Started 61 minutes ago against exam 1's 60 minute window.
    let exam = Exam {
        id: 1,
        title: "Timed exam".to_string(),
        duration_minutes: Some(60),
        total_marks: 10,
        passing_mark: 5,
    };
    let attempt = ExamAttempt::start(&exam, 11, Utc::now() - Duration::minutes(61));
    ctx.store.create(&attempt).await.unwrap();
    let attempt_id = attempt.id;

    // Writes into the buffer are closed off.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/answers"),
            Some(&token),
            Some(serde_json::json!({
                "question_id": 1,
                "payload": { "kind": "choice", "option_ids": [1] }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // So are progress reads.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/attempts/{attempt_id}/progress"),
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // A late submit still lands: the user beat the sweeper to it.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&token),
            Some(serde_json::json!({
                "answers": [
                    { "question_id": 1, "payload": { "kind": "choice", "option_ids": [1] } }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = read_json(response).await;
    assert_eq!(outcome["score"], 5);
}

#[tokio::test]
async fn attempt_routes_enforce_ownership_and_identity() {
    let ctx = setup();
    let owner = bearer(7);
    let intruder = bearer(8);

    let attempt = start_attempt(&ctx, 1, &owner).await;
    let attempt_id = attempt["id"].as_str().unwrap();

    // No token at all.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/attempts/{attempt_id}/progress"),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Someone else's token.
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/attempts/{attempt_id}/submit"),
            Some(&intruder),
            Some(serde_json::json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn starting_twice_conflicts_and_missing_exam_404s() {
    let ctx = setup();
    let token = bearer(9);

    start_attempt(&ctx, 1, &token).await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/exams/1/attempts",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/exams/9999/attempts",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
