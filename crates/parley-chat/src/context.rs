//! Conversation context management.
//!
//! Every turn is appended to the durable log and never removed. What each
//! stage sees is a read-time window: the longest suffix of the history whose
//! estimated token cost fits a budget.

use parley_core::types::{Turn, TurnRole};
use parley_storage::TurnRepository;

use crate::error::ChatError;

// =============================================================================
// Token estimation and windowing
// =============================================================================

/// Estimated token cost of `text`.
///
/// This is a whitespace-delimited word count. It is an approximation, not a
/// model tokenizer count, but it is cheap and deterministic.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Running estimated cost of a window under construction.
#[derive(Debug, Clone, Copy)]
struct Budget {
    limit: usize,
    used: usize,
}

impl Budget {
    fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Charge `turn` if it still fits; a turn that would overflow is refused
    /// whole.
    fn admit(&mut self, turn: &Turn) -> bool {
        let next = self.used.saturating_add(estimate_tokens(&turn.text));
        if next > self.limit {
            return false;
        }
        self.used = next;
        true
    }
}

/// Longest suffix of `turns` whose summed estimated cost is at most `budget`.
///
/// Scans from newest to oldest and stops before the first turn that would
/// overflow; turns are never truncated.
pub fn select_window(turns: &[Turn], budget: usize) -> &[Turn] {
    let mut budget = Budget::new(budget);
    let kept = turns.iter().rev().take_while(|turn| budget.admit(turn)).count();
    &turns[turns.len() - kept..]
}

/// One entry of a context window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub role: TurnRole,
    pub text: String,
}

/// Chronologically ordered view over a user's recent turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextWindow {
    pub entries: Vec<ContextEntry>,
    pub estimated_tokens: usize,
}

impl ContextWindow {
    fn from_turns(turns: &[Turn]) -> Self {
        let entries: Vec<ContextEntry> = turns
            .iter()
            .map(|t| ContextEntry {
                role: t.role,
                text: t.text.clone(),
            })
            .collect();
        let estimated_tokens = entries.iter().map(|e| estimate_tokens(&e.text)).sum();
        Self {
            entries,
            estimated_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render as `role: text` lines, oldest first.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// ContextStore
// =============================================================================

/// Append-only turn log with budgeted read-time windows.
#[derive(Clone)]
pub struct ContextStore {
    turns: TurnRepository,
}

impl ContextStore {
    pub fn new(turns: TurnRepository) -> Self {
        Self { turns }
    }

    /// Record one turn. Fails with `NotFound` when the tenant does not exist.
    pub fn append(
        &self,
        tenant: &str,
        user: &str,
        role: TurnRole,
        text: &str,
    ) -> Result<Turn, ChatError> {
        Ok(self.turns.append(tenant, user, role, text)?)
    }

    /// The user's most recent turns fitting `token_budget`, oldest first.
    ///
    /// Reads newest first and stops at the first turn that would overflow,
    /// so the cost is bounded by the window, not the whole history.
    pub fn window(
        &self,
        tenant: &str,
        user: &str,
        token_budget: usize,
    ) -> Result<ContextWindow, ChatError> {
        let mut newest_first = Vec::new();
        let mut budget = Budget::new(token_budget);
        self.turns.scan_newest_first(tenant, user, |turn| {
            if !budget.admit(&turn) {
                return false;
            }
            newest_first.push(turn);
            true
        })?;
        newest_first.reverse();
        Ok(ContextWindow::from_turns(&newest_first))
    }

    /// The full history, oldest first.
    pub fn history(&self, tenant: &str, user: &str) -> Result<Vec<Turn>, ChatError> {
        Ok(self.turns.list(tenant, user)?)
    }

    /// The full history as a window, oldest first.
    pub fn full_window(&self, tenant: &str, user: &str) -> Result<ContextWindow, ChatError> {
        Ok(ContextWindow::from_turns(&self.history(tenant, user)?))
    }

    /// The most recent turn, if any.
    pub fn latest(&self, tenant: &str, user: &str) -> Result<Option<Turn>, ChatError> {
        let mut latest = None;
        self.turns.scan_newest_first(tenant, user, |turn| {
            latest = Some(turn);
            false
        })?;
        Ok(latest)
    }
}
