// src/grading.rs

use std::collections::{HashMap, HashSet};

use crate::models::answer::AnswerPayload;
use crate::models::question::{Exam, ExamQuestion, QuestionKind};
use crate::models::result::{GradeOutcome, QuestionResult};

/// Grades one answer set against an exam's question definitions.
///
/// Deterministic and side-effect free: persisting the per-question rows and
/// the attempt transition is the submission path's job.
///
/// Rules:
/// * Choice questions score full weight iff the submitted option set is
///   exactly equal to the correct set. No subset/superset credit.
/// * Free-text questions score full weight for any non-empty text, flagged
///   `pending_review` so a manual grading pass can override later.
/// * Questions without an answer score 0; that is not an error.
/// * The denominator is the exam's configured total marks, so unanswered
///   questions count against the student.
pub fn grade(
    exam: &Exam,
    questions: &[ExamQuestion],
    answers: &HashMap<i64, AnswerPayload>,
) -> GradeOutcome {
    let mut results = Vec::with_capacity(questions.len());
    let mut score = 0;

    for question in questions {
        let submitted = answers
            .get(&question.id)
            .cloned()
            .unwrap_or(AnswerPayload::Empty);
        let result = grade_question(question, submitted);
        score += result.marks_earned;
        results.push(result);
    }

    let max_score = exam.total_marks;
    let percentage = if max_score > 0 {
        f64::from(score) / f64::from(max_score) * 100.0
    } else {
        0.0
    };

    GradeOutcome {
        score,
        max_score,
        percentage,
        is_passed: score >= exam.passing_mark,
        time_spent_seconds: 0,
        results,
    }
}

fn grade_question(question: &ExamQuestion, submitted: AnswerPayload) -> QuestionResult {
    let (is_correct, pending_review) = match (question.kind, &submitted) {
        (QuestionKind::Choice, AnswerPayload::Choice { option_ids }) => {
            let given: HashSet<i64> = option_ids.iter().copied().collect();
            let correct: HashSet<i64> = question.correct_option_ids.iter().copied().collect();
            (!correct.is_empty() && given == correct, false)
        }
        (QuestionKind::FreeText, AnswerPayload::Text { text }) => {
            let answered = !text.trim().is_empty();
            (answered, answered)
        }
        // Missing answer or a payload of the wrong kind: zero, not an error.
        _ => (false, false),
    };

    QuestionResult {
        question_id: question.id,
        marks_earned: if is_correct { question.marks } else { 0 },
        max_marks: question.marks,
        is_correct,
        pending_review,
        submitted,
        correct_option_ids: question.correct_option_ids.clone(),
    }
}
