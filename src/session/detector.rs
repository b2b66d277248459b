// src/session/detector.rs

use std::time::{Duration, Instant};

/// How long an ambiguous blur/focus-out signal waits before it is
/// re-validated. Best-effort anti-cheat, not a security boundary: the
/// server-side scoring from canonical answer keys is the real one.
pub const BLUR_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long the transient warning flag stays visible.
pub const WARNING_VISIBLE: Duration = Duration::from_secs(3);

/// Raw environment signal, as reported by the client runtime.
/// Each carries no payload beyond "fired at time T".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSignal {
    /// The document's visibility state changed.
    VisibilityChange,
    /// The window lost focus.
    WindowBlur,
    /// Focus left an element; `has_related_target` is false when focus
    /// left the document entirely.
    FocusOut { has_related_target: bool },
    /// A tab-switch accelerator (Alt+Tab / Cmd+Tab) was pressed.
    TabKeyCombo,
}

/// Point-in-time snapshot of the document's state, taken when a signal
/// fires and again when a pending check is re-validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSnapshot {
    pub hidden: bool,
    pub has_focus: bool,
    /// True when the active element is an embedded frame; blur caused by
    /// focusing an iframe is a known false positive.
    pub active_element_is_frame: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Blur,
    FocusOut,
}

#[derive(Debug, Clone, Copy)]
struct PendingCheck {
    kind: PendingKind,
    due: Instant,
}

/// Decides, from ambiguous visibility/focus signals, whether the user
/// genuinely left the assessment context. One-shot: the first confirmed
/// violation trips the detector for the rest of the attempt.
///
/// Inert unless armed; the owning session controls arming.
#[derive(Debug)]
pub struct TamperDetector {
    armed: bool,
    violations: u32,
    tripped: bool,
    warning_until: Option<Instant>,
    pending: Option<PendingCheck>,
    debounce: Duration,
}

impl TamperDetector {
    pub fn new() -> Self {
        Self::with_debounce(BLUR_DEBOUNCE)
    }

    /// The debounce window is tunable so tests can drive it directly.
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            armed: false,
            violations: 0,
            tripped: false,
            warning_until: None,
            pending: None,
            debounce,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.pending = None;
    }

    /// Full reset, for starting a brand new session only. Never called
    /// mid-session: a tripped detector stays tripped for the attempt.
    pub fn reset(&mut self) {
        self.armed = false;
        self.violations = 0;
        self.tripped = false;
        self.warning_until = None;
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn violation_count(&self) -> u32 {
        self.violations
    }

    /// One-shot flag: once true, stays true until an explicit reset.
    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn warning_visible(&self, now: Instant) -> bool {
        self.warning_until.is_some_and(|until| now < until)
    }

    /// Feeds one raw signal. Returns true when the signal is an
    /// immediate, undebounced violation. Ambiguous signals (blur,
    /// focus-out) only schedule a pending check; `resolve_pending` must
    /// be called once the debounce window has elapsed.
    pub fn observe(&mut self, signal: RawSignal, snapshot: DocumentSnapshot, now: Instant) -> bool {
        if !self.armed {
            return false;
        }

        // Resolve an already-due check first so a rapid signal pair
        // (blur then keypress) cannot starve the earlier one.
        self.resolve_pending(now, snapshot);

        match signal {
            RawSignal::VisibilityChange => {
                // Document going hidden is the highest-confidence signal.
                if snapshot.hidden {
                    self.record_violation(now);
                    return true;
                }
                false
            }
            RawSignal::WindowBlur => {
                self.pending = Some(PendingCheck {
                    kind: PendingKind::Blur,
                    due: now + self.debounce,
                });
                false
            }
            RawSignal::FocusOut { has_related_target } => {
                // Focus moving to another element in the page is normal
                // UI interaction (dropdowns, modals).
                if !has_related_target {
                    self.pending = Some(PendingCheck {
                        kind: PendingKind::FocusOut,
                        due: now + self.debounce,
                    });
                }
                false
            }
            RawSignal::TabKeyCombo => {
                self.record_violation(now);
                true
            }
        }
    }

    /// Re-validates a due pending check against a fresh snapshot.
    /// Returns true when the check confirms a violation.
    pub fn resolve_pending(&mut self, now: Instant, snapshot: DocumentSnapshot) -> bool {
        if !self.armed {
            return false;
        }
        let Some(check) = self.pending else {
            return false;
        };
        if now < check.due {
            return false;
        }
        self.pending = None;

        let confirmed = match check.kind {
            // Blur is suppressed when focus merely moved into an iframe,
            // or when the document turned out to keep focus after all.
            PendingKind::Blur => !snapshot.active_element_is_frame && !snapshot.has_focus,
            // Hidden documents are handled by the visibility path; not
            // double-counting them here.
            PendingKind::FocusOut => !snapshot.has_focus && !snapshot.hidden,
        };

        if confirmed {
            self.record_violation(now);
        }
        confirmed
    }

    fn record_violation(&mut self, now: Instant) {
        self.violations += 1;
        self.tripped = true;
        self.warning_until = Some(now + WARNING_VISIBLE);
    }
}

impl Default for TamperDetector {
    fn default() -> Self {
        Self::new()
    }
}
