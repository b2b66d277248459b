// src/handlers/profile.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        attempt::{QuestionAttempt, QuizAttempt},
        user::{MeResponse, User},
    },
    utils::jwt::Claims,
};

/// Get current user's profile and progress statistics.
pub async fn get_me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let attempts_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&pool)
            .await?;

    Ok(Json(MeResponse {
        id: user.id,
        username: user.username,
        xp: user.xp,
        level: user.level,
        attempts_count,
        created_at: user.created_at,
    }))
}

/// The caller's scored attempts, newest first.
pub async fn get_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE user_id = ? ORDER BY completed_at DESC, id DESC",
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}

/// One attempt with its per-question breakdown. Scoped to the caller:
/// somebody else's attempt id reads as absent.
pub async fn get_attempt_detail(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE id = ? AND user_id = ?",
    )
    .bind(attempt_id)
    .bind(claims.user_id())
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    let questions = sqlx::query_as::<_, QuestionAttempt>(
        "SELECT * FROM question_attempts WHERE attempt_id = ? ORDER BY question_id",
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "attempt": attempt,
        "questions": questions,
    })))
}
