// service/outcome.rs
use std::fmt;

use super::error::ServiceError;

/// A secondary write that may fail without failing the operation that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    DepartmentCounter,
    AgentCounter,
    AgentResolved,
    AgentRating,
    HistoryEntry,
    MessageCounter,
    ActivityTimestamps,
    CannedUsage,
    AutoAssign,
    ChainedAssign,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SideEffect::DepartmentCounter => "department counter",
            SideEffect::AgentCounter => "agent workload counter",
            SideEffect::AgentResolved => "agent resolved counter",
            SideEffect::AgentRating => "agent rating",
            SideEffect::HistoryEntry => "history entry",
            SideEffect::MessageCounter => "message counter",
            SideEffect::ActivityTimestamps => "activity timestamps",
            SideEffect::CannedUsage => "canned response usage",
            SideEffect::AutoAssign => "auto-assign",
            SideEffect::ChainedAssign => "assignment after transfer",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct SideEffectFailure {
    pub effect: SideEffect,
    pub error: ServiceError,
}

/// The primary result of an operation plus every secondary failure it swallowed.
#[derive(Debug)]
#[must_use]
pub struct Outcome<T> {
    pub value: T,
    pub side_effects: Vec<SideEffectFailure>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Outcome {
            value,
            side_effects: Vec::new(),
        }
    }

    pub fn with_failures(value: T, side_effects: Vec<SideEffectFailure>) -> Self {
        Outcome { value, side_effects }
    }

    pub fn is_clean(&self) -> bool {
        self.side_effects.is_empty()
    }

    /// Logs every swallowed failure and hands back the primary value.
    pub fn into_logged(self, operation: &str) -> T {
        for failure in &self.side_effects {
            tracing::warn!(
                operation,
                effect = %failure.effect,
                "Side effect failed: {}",
                failure.error
            );
        }
        self.value
    }
}

/// Collects secondary failures while an operation runs.
#[derive(Debug, Default)]
pub struct SideEffects(Vec<SideEffectFailure>);

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the error, if any, and carries on.
    pub fn note<E: Into<ServiceError>>(&mut self, effect: SideEffect, result: Result<(), E>) {
        if let Err(error) = result {
            self.0.push(SideEffectFailure {
                effect,
                error: error.into(),
            });
        }
    }

    pub fn absorb(&mut self, failures: Vec<SideEffectFailure>) {
        self.0.extend(failures);
    }

    pub fn finish<T>(self, value: T) -> Outcome<T> {
        Outcome::with_failures(value, self.0)
    }
}
