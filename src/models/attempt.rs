// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use validator::Validate;

/// Represents the 'quiz_attempts' table in the database.
/// Append-only: one row per scored submission, never mutated afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,

    /// Percentage score, 0.0..=100.0, one decimal.
    pub score: f64,

    pub correct_answers: i64,
    pub total_questions: i64,
    pub xp_earned: i64,

    /// True when the attempt was force-finalized by a tamper violation.
    pub was_tab_switched: bool,

    /// Seconds spent in the session, when known.
    pub time_spent: Option<i64>,

    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'question_attempts' table: per-question correctness
/// written in the same transaction as the owning QuizAttempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected: Option<String>,
    pub is_correct: bool,
}

/// DTO for a stateless practice submission.
#[derive(Debug, Deserialize, Validate)]
pub struct PracticeSubmitRequest {
    /// Question id -> selected option text.
    pub answers: HashMap<i64, String>,
}

/// DTO for recording one answer inside a live session.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 500))]
    pub selected: String,
}

/// Authoritative result returned by the scoring engine.
/// The client never computes any of these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    pub score: f64,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub xp_earned: i64,
    pub leveled_up: bool,
    pub new_level: i64,
    pub reached_level_20: bool,
    pub is_retake: bool,
}
