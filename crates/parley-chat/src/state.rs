//! Pipeline state machines with validated transitions.
//!
//! Execution: Built -> Executing -> Succeeded | Failed,
//! Failed -> Correcting -> ReExecuting -> Succeeded | FailedFinal.
//!
//! Question: Received -> Clarifying -> AwaitingUser | Clear,
//! Clear -> Executing -> Explaining -> AwaitingFeedback.
//!
//! Feedback: Received -> Classifying -> Done | Reformulating,
//! Reformulating -> Done.

use std::fmt;

use tracing::debug;

// =============================================================================
// Query execution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Built,
    Executing,
    Succeeded,
    Failed,
    Correcting,
    ReExecuting,
    FailedFinal,
}

impl ExecutionState {
    pub fn can_transition(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, to),
            (Built, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
                | (Failed, Correcting)
                | (Correcting, ReExecuting)
                | (Correcting, FailedFinal)
                | (ReExecuting, Succeeded)
                | (ReExecuting, FailedFinal)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Succeeded | ExecutionState::FailedFinal)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Built => "built",
            ExecutionState::Executing => "executing",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::Failed => "failed",
            ExecutionState::Correcting => "correcting",
            ExecutionState::ReExecuting => "re_executing",
            ExecutionState::FailedFinal => "failed_final",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Question handling
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    Received,
    Clarifying,
    AwaitingUser,
    Clear,
    Executing,
    Explaining,
    AwaitingFeedback,
}

impl QuestionState {
    pub fn can_transition(self, to: QuestionState) -> bool {
        use QuestionState::*;
        matches!(
            (self, to),
            (Received, Clarifying)
                | (Clarifying, AwaitingUser)
                | (Clarifying, Clear)
                | (Clear, Executing)
                | (Executing, Explaining)
                | (Explaining, AwaitingFeedback)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QuestionState::AwaitingUser | QuestionState::AwaitingFeedback)
    }
}

impl fmt::Display for QuestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionState::Received => "received",
            QuestionState::Clarifying => "clarifying",
            QuestionState::AwaitingUser => "awaiting_user",
            QuestionState::Clear => "clear",
            QuestionState::Executing => "executing",
            QuestionState::Explaining => "explaining",
            QuestionState::AwaitingFeedback => "awaiting_feedback",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Feedback handling
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackState {
    Received,
    Classifying,
    Reformulating,
    Done,
}

impl FeedbackState {
    pub fn can_transition(self, to: FeedbackState) -> bool {
        use FeedbackState::*;
        matches!(
            (self, to),
            (Received, Classifying)
                | (Classifying, Done)
                | (Classifying, Reformulating)
                | (Reformulating, Done)
        )
    }
}

impl fmt::Display for FeedbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedbackState::Received => "received",
            FeedbackState::Classifying => "classifying",
            FeedbackState::Reformulating => "reformulating",
            FeedbackState::Done => "done",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Something with validated transitions.
pub trait Transition: Copy + fmt::Display + PartialEq {
    fn allowed(self, to: Self) -> bool;
}

impl Transition for ExecutionState {
    fn allowed(self, to: Self) -> bool {
        self.can_transition(to)
    }
}

impl Transition for QuestionState {
    fn allowed(self, to: Self) -> bool {
        self.can_transition(to)
    }
}

impl Transition for FeedbackState {
    fn allowed(self, to: Self) -> bool {
        self.can_transition(to)
    }
}

/// Current state of one pipeline run plus every state it passed through.
#[derive(Debug, Clone)]
pub struct StateTracker<S> {
    machine: &'static str,
    current: S,
    path: Vec<S>,
}

impl<S: Transition> StateTracker<S> {
    pub fn new(machine: &'static str, initial: S) -> Self {
        Self {
            machine,
            current: initial,
            path: vec![initial],
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    /// States visited so far, starting with the initial one.
    pub fn path(&self) -> &[S] {
        &self.path
    }

    /// Move to `to`. Transitions outside the machine are refused and logged.
    pub fn advance(&mut self, to: S) -> bool {
        if !self.current.allowed(to) {
            debug!(machine = self.machine, from = %self.current, to = %to, "Refused state transition");
            return false;
        }
        debug!(machine = self.machine, from = %self.current, to = %to, "State transition");
        self.current = to;
        self.path.push(to);
        true
    }
}
