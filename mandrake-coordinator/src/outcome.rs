//! What [`crate::SessionCoordinator::handle_request`] hands back to its
//! caller once a round stops progressing.

use mandrake_core::{MandrakeError, Round, Turn};

/// Why a round stopped producing further turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorExit {
    /// The assistant finished normally: its last turn either made no tool
    /// calls, or made some and then emitted trailing text.
    Completed,
    /// `max_turns_per_round` was reached before the assistant stopped.
    MaxTurns,
    /// The caller cancelled the request; the round is left in place with
    /// whatever turns were already persisted (spec §4.8 step 4).
    Cancelled,
}

/// The result of one `handle_request` call: the round that was opened,
/// every turn produced within it, and why the loop stopped. A provider
/// error instead returns `Err` directly (spec §4.8 Failure semantics);
/// this type only describes the non-error exits.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// The round this request created.
    pub round: Round,
    /// Every turn produced in this round, in index order.
    pub turns: Vec<Turn>,
    /// Why the inner turn loop stopped.
    pub exit: CoordinatorExit,
}

/// A provider error that aborted the round after at least one turn had
/// already been finalized and persisted — the error the caller receives
/// still carries the turns that did complete, since storage already has
/// them and a retry should not redo that work silently.
#[derive(Debug)]
pub struct RoundAborted {
    /// The underlying classified error.
    pub error: MandrakeError,
    /// The round that was opened before the failure.
    pub round: Round,
    /// Turns that finalized before the failure, in index order.
    pub turns: Vec<Turn>,
}

impl std::fmt::Display for RoundAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round {} aborted: {}", self.round.id, self.error)
    }
}

impl std::error::Error for RoundAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The error type of [`crate::SessionCoordinator::handle_request`].
///
/// Distinguishes a failure before the round existed (fatal to the call,
/// nothing to retry against) from one after (spec §4.8 Failure
/// semantics): the caller can inspect [`RoundAborted::round`] and its
/// completed turns before deciding whether to retry.
#[derive(Debug)]
pub enum HandleRequestError {
    /// `start_round` itself failed; no round was created.
    BeforeRound(MandrakeError),
    /// A round was opened but the loop aborted before it completed
    /// normally.
    Aborted(RoundAborted),
}

impl std::fmt::Display for HandleRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleRequestError::BeforeRound(e) => write!(f, "{e}"),
            HandleRequestError::Aborted(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HandleRequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandleRequestError::BeforeRound(e) => Some(e),
            HandleRequestError::Aborted(e) => Some(e),
        }
    }
}

impl HandleRequestError {
    /// The classified error kind, regardless of which variant this is.
    pub fn kind(&self) -> mandrake_core::ErrorKind {
        match self {
            HandleRequestError::BeforeRound(e) => e.kind(),
            HandleRequestError::Aborted(e) => e.error.kind(),
        }
    }
}
