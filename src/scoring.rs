// src/scoring.rs
//
// Sole authority for correctness, score and reward. Grading is a pure
// function over the canonical answer keys; persistence happens in one
// transaction so a QuizAttempt can never exist without its XP side
// effects (or the other way around).
//
// At-most-once invocation per logical attempt is the session machine's
// latch's job. A duplicate call still grades deterministically but lands
// as a retake: the prior-attempt count is read inside the same
// transaction that inserts the row, so it earns zero XP.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        attempt::QuizResult,
        daily::{CHALLENGE_TYPE_QUIZ, utc_today},
        quiz::{AnswerKey, Quiz},
    },
};

/// Level from which gamified career paths unlock.
pub const PATH_UNLOCK_LEVEL: i64 = 20;

/// Monotonic XP-to-level curve: one level per 100 XP, starting at 1.
pub fn level_for_xp(xp: i64) -> i64 {
    xp.max(0) / 100 + 1
}

/// Per-question grading outcome, persisted alongside the attempt.
#[derive(Debug, Clone)]
pub struct GradedQuestion {
    pub question_id: i64,
    pub selected: Option<String>,
    pub is_correct: bool,
}

/// Result of grading one answer map against one canonical key set.
#[derive(Debug, Clone)]
pub struct Graded {
    pub correct_answers: i64,
    pub total_questions: i64,
    /// 0.0..=100.0, rounded to one decimal.
    pub score: f64,
    pub per_question: Vec<GradedQuestion>,
}

/// Grades an answer map against the canonical keys.
///
/// Correctness is exact string equality between the selected option
/// text and `correct_answer` - never option position, since clients are
/// free to randomize presentation order. Unanswered questions count as
/// incorrect; answer entries with unknown question ids are ignored.
pub fn grade(keys: &[AnswerKey], answers: &HashMap<i64, String>) -> Graded {
    let mut correct = 0i64;
    let mut per_question = Vec::with_capacity(keys.len());

    for key in keys {
        let selected = answers.get(&key.id).cloned();
        let is_correct = selected.as_deref() == Some(key.correct_answer.as_str());
        if is_correct {
            correct += 1;
        }
        per_question.push(GradedQuestion {
            question_id: key.id,
            selected,
            is_correct,
        });
    }

    let total = keys.len() as i64;
    let score = if total == 0 {
        0.0
    } else {
        (correct as f64 / total as f64 * 1000.0).round() / 10.0
    };

    Graded {
        correct_answers: correct,
        total_questions: total,
        score,
        per_question,
    }
}

/// Everything the engine needs to score one finalized attempt. Note the
/// absence of any client-computed score or question content.
#[derive(Debug)]
pub struct Submission {
    pub user_id: i64,
    pub quiz_id: i64,
    /// Question id -> selected option text.
    pub answers: HashMap<i64, String>,
    pub was_tab_switched: bool,
    pub is_daily_challenge: bool,
    pub time_spent: Option<i64>,
}

/// Scores one submission and persists the attempt, XP and level changes
/// in a single transaction.
///
/// The retake flag is a server-side determination from prior-attempt
/// history (same user, same quiz id); a retake scores normally but earns
/// zero XP, which blocks farming via regenerated practice quizzes.
pub async fn score_submission(
    pool: &SqlitePool,
    submission: Submission,
) -> Result<QuizResult, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = ?")
        .bind(submission.quiz_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    // Always reload the canonical question set; the client never sends
    // question content the engine would trust.
    let keys = sqlx::query_as::<_, AnswerKey>(
        "SELECT id, correct_answer FROM questions WHERE quiz_id = ? ORDER BY id",
    )
    .bind(submission.quiz_id)
    .fetch_all(pool)
    .await?;

    if keys.is_empty() {
        return Err(AppError::NotFound("Quiz has no questions".to_string()));
    }

    let graded = grade(&keys, &submission.answers);

    let mut tx = pool.begin().await?;

    // Counted inside the transaction that inserts the attempt, so two
    // racing first submissions cannot both observe zero prior rows and
    // both earn full XP.
    let prior_attempts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ? AND quiz_id = ?",
    )
    .bind(submission.user_id)
    .bind(submission.quiz_id)
    .fetch_one(&mut *tx)
    .await?;
    let is_retake = prior_attempts > 0;

    let xp_earned = if is_retake { 0 } else { quiz.xp_reward };

    // Additive update against the stored total, not a read-modify-write
    // of a stale copy, so concurrent scoring calls cannot lose XP.
    let updated = sqlx::query("UPDATE users SET xp = xp + ? WHERE id = ?")
        .bind(xp_earned)
        .bind(submission.user_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let new_xp: i64 = sqlx::query_scalar("SELECT xp FROM users WHERE id = ?")
        .bind(submission.user_id)
        .fetch_one(&mut *tx)
        .await?;

    let old_level = level_for_xp(new_xp - xp_earned);
    let new_level = level_for_xp(new_xp);
    let leveled_up = new_level > old_level;
    let reached_level_20 = old_level < PATH_UNLOCK_LEVEL && new_level >= PATH_UNLOCK_LEVEL;

    sqlx::query("UPDATE users SET level = ? WHERE id = ?")
        .bind(new_level)
        .bind(submission.user_id)
        .execute(&mut *tx)
        .await?;

    let completed_at = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO quiz_attempts
            (user_id, quiz_id, score, correct_answers, total_questions,
             xp_earned, was_tab_switched, time_spent, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(submission.user_id)
    .bind(submission.quiz_id)
    .bind(graded.score)
    .bind(graded.correct_answers)
    .bind(graded.total_questions)
    .bind(xp_earned)
    .bind(submission.was_tab_switched)
    .bind(submission.time_spent)
    .bind(completed_at)
    .execute(&mut *tx)
    .await?;
    let attempt_id = inserted.last_insert_rowid();

    for gq in &graded.per_question {
        sqlx::query(
            r#"
            INSERT INTO question_attempts (attempt_id, question_id, selected, is_correct)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(attempt_id)
        .bind(gq.question_id)
        .bind(&gq.selected)
        .bind(gq.is_correct)
        .execute(&mut *tx)
        .await?;
    }

    if submission.is_daily_challenge {
        // Consume today's quiz slot in the same transaction as the
        // attempt. The sibling code-type slot is untouched.
        sqlx::query(
            r#"
            UPDATE daily_challenges
            SET completed = 1, completed_at = ?
            WHERE user_id = ? AND challenge_type = ? AND assigned_date = ? AND completed = 0
            "#,
        )
        .bind(completed_at)
        .bind(submission.user_id)
        .bind(CHALLENGE_TYPE_QUIZ)
        .bind(utc_today())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        user_id = submission.user_id,
        quiz_id = submission.quiz_id,
        score = graded.score,
        xp_earned,
        is_retake,
        "Attempt scored"
    );

    Ok(QuizResult {
        score: graded.score,
        correct_answers: graded.correct_answers,
        total_questions: graded.total_questions,
        xp_earned,
        leveled_up,
        new_level,
        reached_level_20,
        is_retake,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<AnswerKey> {
        vec![
            AnswerKey {
                id: 1,
                correct_answer: "Paris".to_string(),
            },
            AnswerKey {
                id: 2,
                correct_answer: "4".to_string(),
            },
            AnswerKey {
                id: 3,
                correct_answer: "Blue".to_string(),
            },
        ]
    }

    #[test]
    fn full_marks() {
        let answers = HashMap::from([
            (1, "Paris".to_string()),
            (2, "4".to_string()),
            (3, "Blue".to_string()),
        ]);
        let graded = grade(&keys(), &answers);
        assert_eq!(graded.correct_answers, 3);
        assert_eq!(graded.total_questions, 3);
        assert_eq!(graded.score, 100.0);
    }

    #[test]
    fn unanswered_questions_count_as_incorrect() {
        let answers = HashMap::from([(1, "Paris".to_string())]);
        let graded = grade(&keys(), &answers);
        assert_eq!(graded.correct_answers, 1);
        assert_eq!(graded.total_questions, 3);
        assert_eq!(graded.score, 33.3);
        assert!(!graded.per_question[1].is_correct);
        assert!(graded.per_question[1].selected.is_none());
    }

    #[test]
    fn unknown_question_ids_are_ignored_not_fatal() {
        let answers = HashMap::from([(99, "Paris".to_string()), (2, "4".to_string())]);
        let graded = grade(&keys(), &answers);
        assert_eq!(graded.correct_answers, 1);
        assert_eq!(graded.total_questions, 3);
        assert_eq!(graded.per_question.len(), 3);
    }

    #[test]
    fn correctness_is_text_equality_not_position() {
        // "Paris" matches wherever it sits in the presented options;
        // an index-based wrong answer with the right position must fail.
        let answers = HashMap::from([(1, "London".to_string())]);
        let graded = grade(&keys(), &answers);
        assert_eq!(graded.correct_answers, 0);
    }

    #[test]
    fn grading_is_pure() {
        let answers = HashMap::from([(1, "Paris".to_string()), (3, "Blue".to_string())]);
        let a = grade(&keys(), &answers);
        let b = grade(&keys(), &answers);
        assert_eq!(a.score, b.score);
        assert_eq!(a.correct_answers, b.correct_answers);
        assert_eq!(a.total_questions, b.total_questions);
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        let keys: Vec<AnswerKey> = (1..=7)
            .map(|id| AnswerKey {
                id,
                correct_answer: "x".to_string(),
            })
            .collect();
        let answers = HashMap::from([(1, "x".to_string()), (2, "x".to_string())]);
        // 2/7 = 28.571... -> 28.6
        assert_eq!(grade(&keys, &answers).score, 28.6);
    }

    #[test]
    fn empty_key_set_scores_zero() {
        let graded = grade(&[], &HashMap::new());
        assert_eq!(graded.score, 0.0);
        assert_eq!(graded.total_questions, 0);
    }

    #[test]
    fn level_curve_is_monotonic() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(1900), 20);
        assert_eq!(level_for_xp(-5), 1);
        let mut prev = 0;
        for xp in (0..5000).step_by(50) {
            let level = level_for_xp(xp);
            assert!(level >= prev);
            prev = level;
        }
    }
}
