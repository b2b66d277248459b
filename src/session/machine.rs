// src/session/machine.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use rand::seq::SliceRandom;
use uuid::Uuid;

use super::detector::{DocumentSnapshot, RawSignal, TamperDetector};
use super::timer::{CountdownTimer, TimerEvent};

/// Lifecycle of one quiz attempt. The four right-hand phases are
/// terminal and mutually exclusive; entering one of them is guarded by
/// a single finalize latch rather than per-field checks, closing the
/// race between a timer expiry and a user click in the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Ready,
    InProgress,
    TerminatedByViolation,
    TerminatedByTimeout,
    Submitted,
    Forfeited,
}

/// Which trigger won the race to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Violation,
    Timeout,
    Submitted,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The session is not in a phase that accepts this action.
    NotInProgress,
    /// The question id is not part of this session's presented set.
    UnknownQuestion(i64),
    /// Manual submission with unanswered questions. Recoverable: the
    /// session stays in-progress and answering may continue.
    Incomplete { missing: usize },
    /// A terminal phase was already entered; the action is dropped.
    AlreadyFinalized,
    /// Forfeiting applies to daily-challenge sessions only.
    NotDailyChallenge,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotInProgress => write!(f, "Session is not in progress"),
            SessionError::UnknownQuestion(id) => {
                write!(f, "Question {} is not part of this session", id)
            }
            SessionError::Incomplete { missing } => {
                write!(f, "Please answer all questions ({} unanswered)", missing)
            }
            SessionError::AlreadyFinalized => write!(f, "Session is already finalized"),
            SessionError::NotDailyChallenge => {
                write!(f, "Only daily-challenge sessions can be forfeited")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// The single authoritative payload handed to the scoring engine when a
/// session finalizes. Produced at most once per session.
#[derive(Debug, Clone)]
pub struct FinalizedAttempt {
    /// Question id -> selected option text. Unseen questions are absent.
    pub answers: HashMap<i64, String>,
    pub was_tab_switched: bool,
    pub time_spent: Option<i64>,
    pub outcome: SessionOutcome,
}

/// Returns a fresh random permutation of the canonical question ids.
/// Question order is randomized per session to deter naive answer-key
/// sharing; option order inside each question stays as stored, which the
/// text-equality answer check tolerates by construction.
pub fn shuffle_order(question_ids: &[i64]) -> Vec<i64> {
    let mut order: Vec<i64> = question_ids.to_vec();
    order.shuffle(&mut rand::thread_rng());
    order
}

/// In-memory state machine for one proctored quiz attempt.
///
/// Owns the tamper detector and countdown timer and coordinates their
/// signals with user actions. All per-attempt mutable state lives here,
/// never in module-level statics, so concurrent sessions are safe.
#[derive(Debug)]
pub struct QuizSession {
    pub id: Uuid,
    pub user_id: i64,
    pub quiz_id: i64,
    pub is_daily: bool,
    pub is_practice: bool,

    question_order: Vec<i64>,
    answers: HashMap<i64, String>,
    detector: TamperDetector,
    timer: CountdownTimer,
    phase: SessionPhase,
    /// Set synchronously before any asynchronous scoring call begins.
    finalized: bool,
    began_at: Option<Instant>,
    /// Holds a finalized payload only after a failed scoring write.
    /// None while a write is in flight, so a concurrent retry cannot
    /// pick up the same payload twice.
    pending_result: Option<FinalizedAttempt>,
}

impl QuizSession {
    pub fn new(
        user_id: i64,
        quiz_id: i64,
        question_ids: &[i64],
        time_limit: Option<u32>,
        is_daily: bool,
        is_practice: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            quiz_id,
            is_daily,
            is_practice,
            question_order: shuffle_order(question_ids),
            answers: HashMap::new(),
            detector: TamperDetector::new(),
            timer: CountdownTimer::new(time_limit),
            phase: SessionPhase::Ready,
            finalized: false,
            began_at: None,
            pending_result: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn question_order(&self) -> &[i64] {
        &self.question_order
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.timer.remaining()
    }

    pub fn violation_count(&self) -> u32 {
        self.detector.violation_count()
    }

    pub fn warning_visible(&self, now: Instant) -> bool {
        self.detector.warning_visible(now)
    }

    /// Ready -> InProgress: arms the detector and starts the countdown.
    /// Idempotent while in progress; dropped after a terminal phase.
    pub fn begin(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Ready => {
                self.phase = SessionPhase::InProgress;
                self.began_at = Some(now);
                self.detector.arm();
                self.timer.start();
                Ok(())
            }
            SessionPhase::InProgress => Ok(()),
            _ => Err(SessionError::AlreadyFinalized),
        }
    }

    /// Records (or overwrites) the answer for one presented question.
    pub fn record_answer(&mut self, question_id: i64, selected: String) -> Result<(), SessionError> {
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if !self.question_order.contains(&question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, selected);
        Ok(())
    }

    /// Feeds one raw tamper signal. A confirmed violation finalizes the
    /// session with whatever answers are currently recorded.
    pub fn observe_signal(
        &mut self,
        signal: RawSignal,
        snapshot: DocumentSnapshot,
        now: Instant,
    ) -> Option<FinalizedAttempt> {
        if self.phase != SessionPhase::InProgress {
            return None;
        }
        self.detector.observe(signal, snapshot, now);
        if self.detector.tripped() {
            return self.finalize(SessionOutcome::Violation, now);
        }
        None
    }

    /// Re-validates a pending debounced check against a fresh snapshot.
    pub fn resolve_pending(
        &mut self,
        now: Instant,
        snapshot: DocumentSnapshot,
    ) -> Option<FinalizedAttempt> {
        if self.phase != SessionPhase::InProgress {
            return None;
        }
        self.detector.resolve_pending(now, snapshot);
        if self.detector.tripped() {
            return self.finalize(SessionOutcome::Violation, now);
        }
        None
    }

    /// Advances the countdown by one second (embedded-driver cadence).
    pub fn tick(&mut self, now: Instant) -> Option<FinalizedAttempt> {
        if self.timer.tick() == TimerEvent::Expired {
            return self.finalize(SessionOutcome::Timeout, now);
        }
        None
    }

    /// Wall-clock deadline path: expires the timer directly.
    pub fn force_timeout(&mut self, now: Instant) -> Option<FinalizedAttempt> {
        if self.timer.force_expire() == TimerEvent::Expired {
            return self.finalize(SessionOutcome::Timeout, now);
        }
        None
    }

    /// Manual submission. The only path that enforces completeness:
    /// every presented question must have an answer. Forced paths
    /// (violation, timeout) submit whatever is recorded.
    pub fn submit(&mut self, now: Instant) -> Result<FinalizedAttempt, SessionError> {
        if self.finalized {
            return Err(SessionError::AlreadyFinalized);
        }
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::NotInProgress);
        }

        let missing = self
            .question_order
            .iter()
            .filter(|id| !self.answers.contains_key(id))
            .count();
        if missing > 0 {
            return Err(SessionError::Incomplete { missing });
        }

        self.finalize(SessionOutcome::Submitted, now)
            .ok_or(SessionError::AlreadyFinalized)
    }

    /// Explicit abandonment of a daily-challenge session. Consumes the
    /// latch without producing a scorable payload.
    pub fn forfeit(&mut self) -> Result<(), SessionError> {
        if !self.is_daily {
            return Err(SessionError::NotDailyChallenge);
        }
        if self.finalized {
            return Err(SessionError::AlreadyFinalized);
        }
        self.finalized = true;
        self.phase = SessionPhase::Forfeited;
        self.timer.stop();
        self.detector.disarm();
        Ok(())
    }

    /// The finalized payload still awaiting a retry after a failed
    /// scoring write, if any.
    pub fn pending_result(&self) -> Option<&FinalizedAttempt> {
        self.pending_result.as_ref()
    }

    /// Claims the retry payload. Whoever takes it owns the next scoring
    /// write; until it is restored, there is nothing left to resubmit.
    pub fn take_pending(&mut self) -> Option<FinalizedAttempt> {
        self.pending_result.take()
    }

    /// Puts a payload back after its scoring write failed, reopening the
    /// retry path (never the latch).
    pub fn restore_pending(&mut self, payload: FinalizedAttempt) {
        self.pending_result = Some(payload);
    }

    /// Enters a terminal phase. The latch is checked and set first;
    /// whichever trigger reaches it first wins, all others become
    /// no-ops. Timer and detector are released on every path. The
    /// returned payload is the session's single scorable artifact: it is
    /// handed to exactly one caller and never retained here, so no
    /// second scoring write can start while the first is in flight.
    fn finalize(&mut self, outcome: SessionOutcome, now: Instant) -> Option<FinalizedAttempt> {
        if self.finalized {
            return None;
        }
        self.finalized = true;

        self.phase = match outcome {
            SessionOutcome::Violation => SessionPhase::TerminatedByViolation,
            SessionOutcome::Timeout => SessionPhase::TerminatedByTimeout,
            SessionOutcome::Submitted => SessionPhase::Submitted,
        };
        self.timer.stop();
        self.detector.disarm();

        Some(FinalizedAttempt {
            answers: self.answers.clone(),
            was_tab_switched: self.detector.tripped(),
            time_spent: self
                .began_at
                .map(|t| now.saturating_duration_since(t).as_secs() as i64),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn snapshot_gone() -> DocumentSnapshot {
        DocumentSnapshot {
            hidden: true,
            has_focus: false,
            active_element_is_frame: false,
        }
    }

    fn in_progress(ids: &[i64], limit: Option<u32>, daily: bool) -> QuizSession {
        let mut s = QuizSession::new(1, 1, ids, limit, daily, false);
        s.begin(Instant::now()).unwrap();
        s
    }

    #[test]
    fn order_is_a_permutation_of_the_canonical_set() {
        let ids = [10, 20, 30, 40, 50];
        let s = QuizSession::new(1, 1, &ids, None, false, false);
        assert_eq!(s.question_order().len(), ids.len());
        let canonical: HashSet<i64> = ids.iter().copied().collect();
        let shuffled: HashSet<i64> = s.question_order().iter().copied().collect();
        assert_eq!(canonical, shuffled);
    }

    #[test]
    fn order_varies_across_loads() {
        let ids: Vec<i64> = (1..=10).collect();
        let orders: HashSet<Vec<i64>> = (0..20).map(|_| shuffle_order(&ids)).collect();
        // 20 draws from 10! permutations virtually never collapse to one.
        assert!(orders.len() > 1);
    }

    #[test]
    fn manual_submit_requires_all_answers() {
        let mut s = in_progress(&[1, 2, 3], None, false);
        s.record_answer(1, "a".into()).unwrap();

        let err = s.submit(Instant::now()).unwrap_err();
        assert_eq!(err, SessionError::Incomplete { missing: 2 });
        // Recoverable: still in progress, answering continues.
        assert_eq!(s.phase(), SessionPhase::InProgress);
        s.record_answer(2, "b".into()).unwrap();
        s.record_answer(3, "c".into()).unwrap();

        let result = s.submit(Instant::now()).unwrap();
        assert_eq!(result.outcome, SessionOutcome::Submitted);
        assert!(!result.was_tab_switched);
        assert_eq!(result.answers.len(), 3);
        assert_eq!(s.phase(), SessionPhase::Submitted);
    }

    #[test]
    fn violation_forces_partial_submission() {
        let mut s = in_progress(&[1, 2, 3], None, false);
        s.record_answer(1, "wrong".into()).unwrap();

        let result = s
            .observe_signal(RawSignal::VisibilityChange, snapshot_gone(), Instant::now())
            .expect("violation must finalize");
        assert_eq!(result.outcome, SessionOutcome::Violation);
        assert!(result.was_tab_switched);
        assert_eq!(result.answers.len(), 1);
        assert_eq!(s.phase(), SessionPhase::TerminatedByViolation);
    }

    #[test]
    fn timeout_forces_submission_without_blame() {
        let mut s = in_progress(&[1, 2, 3], Some(2), false);
        s.record_answer(1, "a".into()).unwrap();
        s.record_answer(2, "b".into()).unwrap();

        assert!(s.tick(Instant::now()).is_none());
        let result = s.tick(Instant::now()).expect("second tick expires");
        assert_eq!(result.outcome, SessionOutcome::Timeout);
        assert!(!result.was_tab_switched);
        assert_eq!(result.answers.len(), 2);
        assert_eq!(s.phase(), SessionPhase::TerminatedByTimeout);
    }

    #[test]
    fn latch_allows_exactly_one_finalization() {
        let mut s = in_progress(&[1], Some(1), false);
        s.record_answer(1, "a".into()).unwrap();

        // Timer and detector race; the timer wins here.
        assert!(s.force_timeout(Instant::now()).is_some());
        assert!(
            s.observe_signal(RawSignal::TabKeyCombo, snapshot_gone(), Instant::now())
                .is_none()
        );
        assert!(matches!(
            s.submit(Instant::now()),
            Err(SessionError::AlreadyFinalized)
        ));
        assert!(s.force_timeout(Instant::now()).is_none());
        assert_eq!(s.phase(), SessionPhase::TerminatedByTimeout);
    }

    #[test]
    fn answers_after_terminal_phase_are_dropped() {
        let mut s = in_progress(&[1, 2], None, false);
        s.observe_signal(RawSignal::TabKeyCombo, snapshot_gone(), Instant::now());
        assert_eq!(
            s.record_answer(1, "late".into()),
            Err(SessionError::NotInProgress)
        );
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut s = in_progress(&[1, 2], None, false);
        assert_eq!(
            s.record_answer(99, "a".into()),
            Err(SessionError::UnknownQuestion(99))
        );
    }

    #[test]
    fn forfeit_is_daily_only_and_unscored() {
        let mut s = in_progress(&[1], None, false);
        assert_eq!(s.forfeit(), Err(SessionError::NotDailyChallenge));

        let mut daily = in_progress(&[1], None, true);
        daily.forfeit().unwrap();
        assert_eq!(daily.phase(), SessionPhase::Forfeited);
        assert!(daily.pending_result().is_none());
        // The latch is consumed: no scoring path remains.
        assert!(matches!(
            daily.submit(Instant::now()),
            Err(SessionError::AlreadyFinalized)
        ));
    }

    #[test]
    fn finalized_payload_is_handed_to_exactly_one_owner() {
        let mut s = in_progress(&[1], None, false);
        s.record_answer(1, "a".into()).unwrap();
        let payload = s.submit(Instant::now()).unwrap();

        // Nothing is retained while the scoring write is in flight; a
        // concurrent caller has no payload to claim.
        assert!(s.pending_result().is_none());
        assert!(s.take_pending().is_none());
        assert!(s.is_finalized());

        // A failed write puts the payload back; the retry claims it
        // exactly once and the latch never reopens.
        s.restore_pending(payload);
        let retry = s.take_pending().expect("retry payload");
        assert_eq!(retry.outcome, SessionOutcome::Submitted);
        assert_eq!(retry.answers.len(), 1);
        assert!(s.take_pending().is_none());
        assert!(s.is_finalized());
    }

    #[test]
    fn begin_after_terminal_phase_is_rejected() {
        let mut s = in_progress(&[1], None, true);
        s.forfeit().unwrap();
        assert_eq!(s.begin(Instant::now()), Err(SessionError::AlreadyFinalized));
    }

    #[test]
    fn untimed_session_never_times_out() {
        let mut s = in_progress(&[1], None, false);
        assert!(s.tick(Instant::now()).is_none());
        assert!(s.force_timeout(Instant::now()).is_none());
        assert_eq!(s.phase(), SessionPhase::InProgress);
    }
}
