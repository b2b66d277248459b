// src/handlers/daily.rs
//
// The daily-challenge gate: one quiz-type and one code-type task per
// user per UTC calendar day, each consumable exactly once - through a
// genuine submission or an explicit forfeit. The two types are fully
// independent: consuming one never touches the other.

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::daily::{
        CHALLENGE_TYPE_CODE, CHALLENGE_TYPE_QUIZ, CodeChallenge, CodeSubmitRequest,
        DailyChallenge, ForfeitRequest, utc_today,
    },
    scoring::level_for_xp,
    state::AppState,
    utils::jwt::Claims,
};

/// Returns today's two assignments for the current user, creating them
/// on first request. Assignment is deterministic by calendar date
/// (days-since-epoch modulo catalog size), so every request the same
/// day resolves to the same challenge.
pub async fn get_daily(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let today = utc_today();

    let quiz = resolve_assignment(&pool, user_id, CHALLENGE_TYPE_QUIZ, &today).await?;
    let code = resolve_assignment(&pool, user_id, CHALLENGE_TYPE_CODE, &today).await?;

    Ok(Json(json!({
        "quiz": quiz,
        "code": code,
    })))
}

/// Forfeits one of today's challenges without an active session. Marks
/// the slot consumed with no scoring side effect; the sibling type for
/// the same day is untouched.
pub async fn forfeit_daily(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ForfeitRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.challenge_type != CHALLENGE_TYPE_QUIZ && req.challenge_type != CHALLENGE_TYPE_CODE {
        return Err(AppError::BadRequest(format!(
            "Unknown challenge type '{}'",
            req.challenge_type
        )));
    }

    let user_id = claims.user_id();
    let today = utc_today();

    let assignment = sqlx::query_as::<_, DailyChallenge>(
        r#"
        SELECT * FROM daily_challenges
        WHERE user_id = ? AND challenge_type = ? AND challenge_id = ? AND assigned_date = ?
        "#,
    )
    .bind(user_id)
    .bind(&req.challenge_type)
    .bind(req.challenge_id)
    .bind(&today)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("No such challenge assigned today".to_string()))?;

    if assignment.completed {
        return Err(AppError::Conflict(
            "Today's challenge is already consumed".to_string(),
        ));
    }

    sqlx::query("UPDATE daily_challenges SET completed = 1, completed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(assignment.id)
        .execute(&pool)
        .await?;

    tracing::info!(
        user_id,
        challenge_type = %req.challenge_type,
        challenge_id = req.challenge_id,
        "Daily challenge forfeited"
    );

    Ok(Json(json!({ "completed": true })))
}

/// Submits a solution to today's code challenge. Runs the stored test
/// cases through the judge, consumes the day's code slot, and awards
/// the challenge's XP when every case passes on a first completion.
pub async fn submit_daily_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CodeSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = req.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let user_id = claims.user_id();
    let today = utc_today();

    let assignment = sqlx::query_as::<_, DailyChallenge>(
        r#"
        SELECT * FROM daily_challenges
        WHERE user_id = ? AND challenge_type = ? AND assigned_date = ?
        "#,
    )
    .bind(user_id)
    .bind(CHALLENGE_TYPE_CODE)
    .bind(&today)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("No daily code challenge assigned".to_string()))?;

    // Fast path only; the guarded update below is authoritative.
    if assignment.completed {
        return Err(AppError::Conflict(
            "Today's code challenge is already consumed".to_string(),
        ));
    }

    let challenge = sqlx::query_as::<_, CodeChallenge>("SELECT * FROM code_challenges WHERE id = ?")
        .bind(assignment.challenge_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Code challenge not found".to_string()))?;

    let results = state
        .judge
        .run_test_cases(&req.source_code, req.language_id, &challenge.test_cases)
        .await;
    let all_passed = !results.is_empty() && results.iter().all(|r| r.passed);

    let mut tx = state.pool.begin().await?;

    // Consuming the slot is the serialization point. The judge run above
    // is slow, so the early `completed` check alone cannot exclude a
    // racing submission; the guarded update resolves the race to exactly
    // one winner.
    let consumed = sqlx::query(
        "UPDATE daily_challenges SET completed = 1, completed_at = ? WHERE id = ? AND completed = 0",
    )
    .bind(Utc::now())
    .bind(assignment.id)
    .execute(&mut *tx)
    .await?;
    if consumed.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Today's code challenge is already consumed".to_string(),
        ));
    }

    // Retake detection mirrors the quiz engine: a previously consumed
    // assignment of the same challenge means no repeat XP. Today's row
    // was just consumed above, so it is excluded.
    let prior: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM daily_challenges
        WHERE user_id = ? AND challenge_type = ? AND challenge_id = ?
          AND completed = 1 AND id != ?
        "#,
    )
    .bind(user_id)
    .bind(CHALLENGE_TYPE_CODE)
    .bind(assignment.challenge_id)
    .bind(assignment.id)
    .fetch_one(&mut *tx)
    .await?;
    let is_retake = prior > 0;

    let xp_earned = if all_passed && !is_retake {
        challenge.xp_reward
    } else {
        0
    };

    sqlx::query("UPDATE users SET xp = xp + ? WHERE id = ?")
        .bind(xp_earned)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let new_xp: i64 = sqlx::query_scalar("SELECT xp FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET level = ? WHERE id = ?")
        .bind(level_for_xp(new_xp))
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "passed": all_passed,
        "results": results,
        "xp_earned": xp_earned,
        "is_retake": is_retake,
    })))
}

/// Looks up today's assignment for one challenge type, creating it when
/// missing. The UNIQUE(user, type, date) constraint makes concurrent
/// first requests collapse to a single row.
async fn resolve_assignment(
    pool: &SqlitePool,
    user_id: i64,
    challenge_type: &str,
    today: &str,
) -> Result<DailyChallenge, AppError> {
    if let Some(existing) = sqlx::query_as::<_, DailyChallenge>(
        "SELECT * FROM daily_challenges WHERE user_id = ? AND challenge_type = ? AND assigned_date = ?",
    )
    .bind(user_id)
    .bind(challenge_type)
    .bind(today)
    .fetch_optional(pool)
    .await?
    {
        return Ok(existing);
    }

    let challenge_id = pick_for_date(pool, challenge_type).await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO daily_challenges
            (user_id, challenge_type, challenge_id, assigned_date, completed)
        VALUES (?, ?, ?, ?, 0)
        "#,
    )
    .bind(user_id)
    .bind(challenge_type)
    .bind(challenge_id)
    .bind(today)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, DailyChallenge>(
        "SELECT * FROM daily_challenges WHERE user_id = ? AND challenge_type = ? AND assigned_date = ?",
    )
    .bind(user_id)
    .bind(challenge_type)
    .bind(today)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)
}

/// Deterministic pick for the calendar day: days-since-epoch modulo the
/// catalog size, over ids in stable order.
async fn pick_for_date(pool: &SqlitePool, challenge_type: &str) -> Result<i64, AppError> {
    let table = if challenge_type == CHALLENGE_TYPE_QUIZ {
        "quizzes"
    } else {
        "code_challenges"
    };

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(AppError::NotFound(format!(
            "No {} challenges available",
            challenge_type
        )));
    }

    let days_since_epoch = Utc::now().timestamp() / 86_400;
    let offset = days_since_epoch.rem_euclid(count);

    let id: i64 = sqlx::query_scalar(&format!(
        "SELECT id FROM {} ORDER BY id LIMIT 1 OFFSET ?",
        table
    ))
    .bind(offset)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
