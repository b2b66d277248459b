// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Represents the 'quizzes' table in the database.
/// Immutable once created; sessions only ever read it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    /// Difficulty label: 'beginner', 'intermediate' or 'advanced'.
    pub difficulty: String,

    /// Career path this quiz belongs to, if any.
    pub career_path_id: Option<i64>,

    /// Minimum user level required to start a session.
    pub required_level: i64,

    /// XP granted on a first, non-retake completion.
    pub xp_reward: i64,

    /// Time limit in seconds. None means the session is untimed.
    pub time_limit: Option<i64>,

    pub is_final_assessment: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub quiz_id: i64,

    /// The text content of the question.
    pub content: String,

    /// Ordered list of option strings, stored as a JSON array.
    pub options: Json<Vec<String>>,

    /// The literal text of the correct option. Correctness is decided by
    /// string equality against this value, never by option position:
    /// presentation order is free to change without breaking the key.
    pub correct_answer: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to the client (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub content: String,
    pub options: Json<Vec<String>>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            quiz_id: q.quiz_id,
            content: q.content,
            options: q.options,
        }
    }
}

/// Answer key row used by the scoring engine. Loaded fresh from the
/// database on every submission; question content sent by a client is
/// never consulted.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerKey {
    pub id: i64,
    pub correct_answer: String,
}
