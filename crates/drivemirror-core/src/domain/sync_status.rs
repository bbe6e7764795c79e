//! Per-principal sync status
//!
//! State machine: `idle -> running -> (idle | error)`, and `error -> running`
//! for the next attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{errors::DomainError, newtypes::{CycleMarker, PrincipalId}};

/// Phase of the reconciliation state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Error,
}

impl SyncState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Idle, SyncState::Running)
                | (SyncState::Error, SyncState::Running)
                | (SyncState::Running, SyncState::Idle)
                | (SyncState::Running, SyncState::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Running => "running",
            SyncState::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncState::Idle),
            "running" => Ok(SyncState::Running),
            "error" => Ok(SyncState::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown sync state: {other}"
            ))),
        }
    }
}

/// Sync status row of one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub principal_id: PrincipalId,
    pub state: SyncState,
    /// Marker of the most recently started cycle
    pub last_cycle: CycleMarker,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Status of a principal that never attempted a cycle
    pub fn initial(principal_id: PrincipalId) -> Self {
        Self {
            principal_id,
            state: SyncState::Idle,
            last_cycle: CycleMarker::default(),
            last_started: None,
            last_finished: None,
            last_error: None,
        }
    }

    /// Records the successful end of the running cycle
    ///
    /// # Errors
    /// Returns `InvalidState` unless the status is `running`
    pub fn finish(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(SyncState::Idle)?;
        self.last_finished = Some(at);
        self.last_error = None;
        Ok(())
    }

    /// Records the failed end of the running cycle
    ///
    /// # Errors
    /// Returns `InvalidState` unless the status is `running`
    pub fn fail(&mut self, at: DateTime<Utc>, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition(SyncState::Error)?;
        self.last_finished = Some(at);
        self.last_error = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, next: SyncState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidState {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}
