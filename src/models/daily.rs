// src/models/daily.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Challenge kinds a user gets one of per calendar day.
pub const CHALLENGE_TYPE_QUIZ: &str = "quiz";
pub const CHALLENGE_TYPE_CODE: &str = "code";

/// The gate's calendar-day policy: days roll over at UTC midnight.
pub fn utc_today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Represents the 'daily_challenges' table.
/// One row per (user, type, UTC calendar day); `completed` flips to true
/// exactly once, through a genuine submission or an explicit forfeit,
/// and never reopens for the same day.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DailyChallenge {
    pub id: i64,
    pub user_id: i64,

    /// 'quiz' or 'code'.
    pub challenge_type: String,

    /// Id of the assigned quiz or code challenge.
    pub challenge_id: i64,

    /// UTC calendar day, formatted YYYY-MM-DD.
    pub assigned_date: String,

    pub completed: bool,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'code_challenges' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub language_id: i64,
    pub xp_reward: i64,

    /// Test cases stored as a JSON array.
    pub test_cases: Json<Vec<CodeTestCase>>,
}

/// One stdin/expected-output pair for the judge runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeTestCase {
    pub stdin: String,
    pub expected_output: String,
}

/// DTO for forfeiting a daily challenge without an active session.
#[derive(Debug, Deserialize)]
pub struct ForfeitRequest {
    pub challenge_id: i64,
    pub challenge_type: String,
}

/// DTO for submitting a solution to today's code challenge.
#[derive(Debug, Deserialize, Validate)]
pub struct CodeSubmitRequest {
    #[validate(length(min = 1, max = 65536))]
    pub source_code: String,
    #[validate(range(min = 1))]
    pub language_id: i64,
}
