//! Per-parameter alert state machine.
//!
//! ```text
//!              CRITICAL                       CRITICAL
//!   NORMAL ──────────────► ACTIVE ◄────────────────┐
//!     ▲  │   (Raised)        │  └──────────────────┘
//!     │  │                   │        (Held)
//!     │  └── not CRITICAL    │ not CRITICAL
//!     │       (Quiet)        │  (Cleared, latch reset)
//!     └──────────────────────┘
//! ```
//!
//! Each parameter owns an independent [`AlertState`]. The notification latch
//! is only ever set by [`AlertState::mark_notified`] while ACTIVE and is
//! cleared on the way back to NORMAL.

use chrono::{DateTime, Local};
use serde::Serialize;

use super::threshold::{ParameterStatus, Severity};
use crate::models::Parameter;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPhase {
    Normal,
    Active,
}

/// Edge produced by one step of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// NORMAL → NORMAL
    Quiet,
    /// NORMAL → ACTIVE; a notification is now armed.
    Raised,
    /// ACTIVE → ACTIVE
    Held,
    /// ACTIVE → NORMAL; the latch was cleared.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    // ---
    phase: AlertPhase,

    /// Time of the last phase change.
    changed_at: Option<DateTime<Local>>,

    /// True once a notification went out for the current episode.
    latch: bool,

    /// Tick of the last delivery attempt, so a tick never retries twice.
    last_attempt: Option<u64>,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            phase: AlertPhase::Normal,
            changed_at: None,
            latch: false,
            last_attempt: None,
        }
    }
}

impl AlertState {
    // ---
    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == AlertPhase::Active
    }

    pub fn latched(&self) -> bool {
        self.latch
    }

    pub fn changed_at(&self) -> Option<DateTime<Local>> {
        self.changed_at
    }

    /// Advance on a freshly classified reading.
    pub fn step(&mut self, severity: Severity, at: DateTime<Local>) -> Transition {
        // ---
        let critical = severity == Severity::Critical;

        match (self.phase, critical) {
            (AlertPhase::Normal, false) => Transition::Quiet,
            (AlertPhase::Normal, true) => {
                self.phase = AlertPhase::Active;
                self.changed_at = Some(at);
                self.latch = false;
                Transition::Raised
            }
            (AlertPhase::Active, true) => Transition::Held,
            (AlertPhase::Active, false) => {
                self.phase = AlertPhase::Normal;
                self.changed_at = Some(at);
                self.latch = false;
                self.last_attempt = None;
                Transition::Cleared
            }
        }
    }

    /// Whether the dispatcher should try to deliver during `tick`.
    pub fn wants_notification(&self, tick: u64) -> bool {
        self.is_active() && !self.latch && self.last_attempt != Some(tick)
    }

    pub fn record_attempt(&mut self, tick: u64) {
        self.last_attempt = Some(tick);
    }

    /// Set the latch after a successful delivery. Ignored outside ACTIVE.
    pub fn mark_notified(&mut self) -> bool {
        // ---
        if self.is_active() {
            self.latch = true;
        }
        self.latch
    }
}

/// The full set of per-parameter state machines for one session.
#[derive(Debug, Clone, Default)]
pub struct AlertBoard {
    states: [AlertState; Parameter::COUNT],
}

impl AlertBoard {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, parameter: Parameter) -> &AlertState {
        &self.states[parameter.index()]
    }

    pub fn state_mut(&mut self, parameter: Parameter) -> &mut AlertState {
        &mut self.states[parameter.index()]
    }

    /// Step every machine with its parameter's status. Order is irrelevant,
    /// the machines share nothing.
    pub fn apply(
        &mut self,
        statuses: &[ParameterStatus; Parameter::COUNT],
        at: DateTime<Local>,
    ) -> [Transition; Parameter::COUNT] {
        // ---
        Parameter::ALL.map(|p| {
            let transition = self.states[p.index()].step(statuses[p.index()].severity, at);
            match transition {
                Transition::Raised => tracing::info!("Alert raised for {}", p.key()),
                Transition::Cleared => tracing::info!("Alert cleared for {}", p.key()),
                _ => {}
            }
            transition
        })
    }

    pub fn any_active(&self) -> bool {
        self.states.iter().any(AlertState::is_active)
    }

    pub fn active(&self) -> impl Iterator<Item = Parameter> + '_ {
        Parameter::ALL
            .into_iter()
            .filter(|p| self.states[p.index()].is_active())
    }

    /// Number of parameters whose current episode has been notified.
    pub fn latched_count(&self) -> usize {
        self.states.iter().filter(|s| s.latched()).count()
    }
}
