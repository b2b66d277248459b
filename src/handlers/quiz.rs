// src/handlers/quiz.rs
//
// HTTP surface of the proctored session: session creation, answer
// recording, tamper events, manual submission and the stateless
// practice path. The state machine itself lives in crate::session;
// handlers only translate transport to machine calls and hand finalized
// payloads to the scoring engine.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{PracticeSubmitRequest, QuizResult, RecordAnswerRequest},
        daily::{CHALLENGE_TYPE_QUIZ, DailyChallenge, utc_today},
        quiz::{PublicQuestion, Question, Quiz},
    },
    scoring::{self, Submission},
    session::{DocumentSnapshot, FinalizedAttempt, QuizSession, RawSignal, SessionPhase},
    state::{AppState, SharedSession},
    utils::jwt::Claims,
};

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// True when this session consumes today's daily quiz slot.
    #[serde(default)]
    pub daily: bool,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub quiz_id: i64,
    pub title: String,
    pub time_limit: Option<i64>,
    /// Questions in this session's randomized order, without answer keys.
    pub questions: Vec<PublicQuestion>,
}

/// Raw signal kinds a client may report. `Snapshot` carries no signal;
/// it only re-validates a pending debounced check.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    VisibilityChange,
    WindowBlur,
    FocusOut,
    TabKeyCombo,
    Snapshot,
}

#[derive(Debug, Deserialize)]
pub struct SessionEventRequest {
    pub signal: SignalKind,
    #[serde(default)]
    pub has_related_target: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub has_focus: bool,
    #[serde(default)]
    pub active_element_is_frame: bool,
}

impl SessionEventRequest {
    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            hidden: self.hidden,
            has_focus: self.has_focus,
            active_element_is_frame: self.active_element_is_frame,
        }
    }
}

/// Creates a proctored session: loads the quiz and its canonical
/// question set, checks the level gate and (for daily sessions) the
/// daily slot, shuffles question order and returns the presentation set
/// without answer keys.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    let user_level: i64 = sqlx::query_scalar("SELECT level FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user_level < quiz.required_level {
        return Err(AppError::Forbidden(format!(
            "Level {} required to start this quiz",
            quiz.required_level
        )));
    }

    if req.daily {
        let assignment = sqlx::query_as::<_, DailyChallenge>(
            "SELECT * FROM daily_challenges WHERE user_id = ? AND challenge_type = ? AND assigned_date = ?",
        )
        .bind(user_id)
        .bind(CHALLENGE_TYPE_QUIZ)
        .bind(utc_today())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("No daily quiz assigned for today".to_string()))?;

        if assignment.challenge_id != quiz_id {
            return Err(AppError::BadRequest(
                "This quiz is not today's daily challenge".to_string(),
            ));
        }
        if assignment.completed {
            return Err(AppError::Conflict(
                "Today's daily quiz is already consumed".to_string(),
            ));
        }
    }

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE quiz_id = ? ORDER BY id")
            .bind(quiz_id)
            .fetch_all(&state.pool)
            .await?;

    if questions.is_empty() {
        return Err(AppError::NotFound("Quiz has no questions".to_string()));
    }

    let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let time_limit = quiz.time_limit.and_then(|v| u32::try_from(v).ok());

    let session = QuizSession::new(user_id, quiz_id, &question_ids, time_limit, req.daily, false);
    let session_id = session.id;

    // Order the public questions per this session's fresh shuffle.
    let mut by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();
    let ordered: Vec<PublicQuestion> = session
        .question_order()
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(PublicQuestion::from)
        .collect();

    state.sessions.insert(session).await;

    tracing::info!(user_id, quiz_id, %session_id, daily = req.daily, "Session created");

    Ok(Json(StartSessionResponse {
        session_id,
        quiz_id,
        title: quiz.title,
        time_limit: quiz.time_limit,
        questions: ordered,
    }))
}

/// Ready -> InProgress: arms the detector, starts the countdown, and
/// spawns the wall-clock deadline task when the quiz is timed.
pub async fn begin_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let shared = lookup(&state, &claims, &session_id).await?;

    let (fresh, remaining) = {
        let mut session = shared.lock().await;
        let fresh = session.phase() == SessionPhase::Ready;
        session.begin(Instant::now())?;
        (fresh, session.remaining_seconds())
    };

    // Spawn the deadline task once; a repeated begin is a no-op.
    if fresh {
        if let Some(limit) = remaining {
            spawn_deadline_task(state.clone(), shared.clone(), session_id, limit);
        }
    }

    Ok(Json(json!({
        "started": true,
        "remaining_seconds": remaining,
    })))
}

/// Records one answer for a live session.
pub async fn record_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = req.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let shared = lookup(&state, &claims, &session_id).await?;
    shared
        .lock()
        .await
        .record_answer(req.question_id, req.selected)?;

    Ok(Json(json!({ "recorded": true })))
}

/// Delivers one raw tamper signal (or a bare snapshot that resolves a
/// pending debounced check). A confirmed violation force-finalizes the
/// session and scores whatever answers were recorded.
pub async fn session_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SessionEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let shared = lookup(&state, &claims, &session_id).await?;
    let now = Instant::now();
    let snapshot = req.snapshot();

    let (payload, violations, warning) = {
        let mut session = shared.lock().await;
        let payload = match req.signal {
            SignalKind::Snapshot => session.resolve_pending(now, snapshot),
            SignalKind::VisibilityChange => {
                session.observe_signal(RawSignal::VisibilityChange, snapshot, now)
            }
            SignalKind::WindowBlur => {
                session.observe_signal(RawSignal::WindowBlur, snapshot, now)
            }
            SignalKind::FocusOut => session.observe_signal(
                RawSignal::FocusOut {
                    has_related_target: req.has_related_target,
                },
                snapshot,
                now,
            ),
            SignalKind::TabKeyCombo => {
                session.observe_signal(RawSignal::TabKeyCombo, snapshot, now)
            }
        };
        (
            payload,
            session.violation_count(),
            session.warning_visible(now),
        )
    };

    let result = match payload {
        Some(payload) => Some(score_finalized(&state, &shared, payload).await?),
        None => None,
    };

    Ok(Json(json!({
        "violations": violations,
        "warning": warning,
        "finalized": result.is_some(),
        "result": result,
    })))
}

/// Manual submission. Completeness is enforced here and only here; an
/// incomplete submission is a recoverable validation error. Also serves
/// as the retry path when a finalized session's scoring write failed.
pub async fn submit_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let shared = lookup(&state, &claims, &session_id).await?;

    let payload = {
        let mut session = shared.lock().await;
        if session.is_finalized() {
            // The latch never reopens; a retained payload means the
            // previous scoring write failed and gets one more try.
            // Taking it leaves nothing behind, so a concurrent retry
            // that arrives while this write is in flight gets 409.
            session
                .take_pending()
                .ok_or_else(|| AppError::Conflict("Session already submitted".to_string()))?
        } else {
            session.submit(Instant::now())?
        }
    };

    let result = score_finalized(&state, &shared, payload).await?;
    Ok(Json(result))
}

/// Explicit abandonment of a daily-challenge session: consumes today's
/// quiz slot with no scored attempt.
pub async fn forfeit_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let shared = lookup(&state, &claims, &session_id).await?;

    {
        let mut session = shared.lock().await;
        session.forfeit()?;
    }

    sqlx::query(
        r#"
        UPDATE daily_challenges
        SET completed = 1, completed_at = ?
        WHERE user_id = ? AND challenge_type = ? AND assigned_date = ? AND completed = 0
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(claims.user_id())
    .bind(CHALLENGE_TYPE_QUIZ)
    .bind(utc_today())
    .execute(&state.pool)
    .await?;

    state.sessions.remove(&session_id).await;

    tracing::info!(user_id = claims.user_id(), %session_id, "Daily quiz forfeited");

    Ok(Json(json!({ "forfeited": true })))
}

/// Stateless practice submission: the identical scoring contract, no
/// proctoring and no daily bookkeeping. Retakes score normally but earn
/// zero XP, which the engine decides from attempt history.
pub async fn practice_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<PracticeSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = req.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let result = scoring::score_submission(
        &state.pool,
        Submission {
            user_id: claims.user_id(),
            quiz_id,
            answers: req.answers,
            was_tab_switched: false,
            is_daily_challenge: false,
            time_spent: None,
        },
    )
    .await?;

    Ok(Json(result))
}

/// Fetches a live session, enforcing that it belongs to the caller.
async fn lookup(
    state: &AppState,
    claims: &Claims,
    session_id: &Uuid,
) -> Result<SharedSession, AppError> {
    let shared = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if shared.lock().await.user_id != claims.user_id() {
        return Err(AppError::Forbidden("Not your session".to_string()));
    }
    Ok(shared)
}

/// Hands a finalized payload to the scoring engine. The caller owns the
/// payload exclusively (the machine hands it out exactly once), so at
/// most one scoring write per session is ever in flight. On success the
/// session is dropped from the store; on failure the payload is put
/// back for the retry path.
async fn score_finalized(
    state: &AppState,
    shared: &SharedSession,
    payload: FinalizedAttempt,
) -> Result<QuizResult, AppError> {
    let (session_id, user_id, quiz_id, is_daily) = {
        let session = shared.lock().await;
        (session.id, session.user_id, session.quiz_id, session.is_daily)
    };

    let scored = scoring::score_submission(
        &state.pool,
        Submission {
            user_id,
            quiz_id,
            answers: payload.answers.clone(),
            was_tab_switched: payload.was_tab_switched,
            is_daily_challenge: is_daily,
            time_spent: payload.time_spent,
        },
    )
    .await;

    match scored {
        Ok(result) => {
            state.sessions.remove(&session_id).await;
            Ok(result)
        }
        Err(e) => {
            shared.lock().await.restore_pending(payload);
            Err(e)
        }
    }
}

/// Wall-clock enforcement of the quiz's time limit. Sleeps to the
/// deadline, then races the finalize latch: if anything else finalized
/// the session first, `force_timeout` is a no-op.
fn spawn_deadline_task(state: AppState, shared: SharedSession, session_id: Uuid, limit: u32) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(limit as u64)).await;

        let payload = shared.lock().await.force_timeout(Instant::now());
        let Some(payload) = payload else {
            return;
        };

        tracing::info!(%session_id, "Time expired, forcing submission");
        if let Err(e) = score_finalized(&state, &shared, payload).await {
            // Payload was put back; the client can retry via submit.
            tracing::error!(%session_id, "Forced submission failed: {}", e);
        }
    });
}
