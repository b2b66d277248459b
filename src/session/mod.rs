// src/session/mod.rs
//
// Deterministic core of a proctored quiz attempt: tamper detection,
// countdown, and the session state machine. No IO in this module; the
// HTTP layer and tests drive it with explicit instants and snapshots.

pub mod detector;
pub mod machine;
pub mod timer;

pub use detector::{DocumentSnapshot, RawSignal, TamperDetector};
pub use machine::{
    FinalizedAttempt, QuizSession, SessionError, SessionOutcome, SessionPhase, shuffle_order,
};
pub use timer::{CountdownTimer, TimerEvent};
