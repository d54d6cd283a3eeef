//! Alert & notification engine.
//!
//! One [`AlertEngine::tick`] runs the pipeline for one sample, in order:
//! threshold evaluation, state machine step, mail dispatch, alarm gate.
//! Everything happens synchronously inside the call; the caller decides the
//! cadence. Callers that must not hold the engine while mail is in flight
//! split the tick with [`AlertEngine::begin_tick`] and
//! [`AlertEngine::finish_tick`].

mod alarm;
mod dispatch;
mod state;
mod threshold;

pub use alarm::{AudibleAlarm, AudioCue, BEEP_PATH, BEEP_WAV};
pub use dispatch::{
    compose_alert, prepare, record, Delivery, DispatchOutcome, NotificationDispatcher, PendingAlert,
};
pub use state::{AlertBoard, AlertPhase, AlertState, Transition};
pub use threshold::{air_quality, classify, classify_sample, ParameterStatus, Severity};

use serde::Serialize;

use crate::mail::MailTransport;
use crate::models::{Parameter, Sample};

// ---

/// Per-parameter line of a tick result.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterReport {
    // ---
    pub parameter: Parameter,
    pub label: &'static str,
    pub unit: &'static str,
    pub value: f64,
    pub severity: Severity,
    pub status: &'static str,
    pub phase: AlertPhase,
    pub transition: Transition,
}

/// Everything one tick produced.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    // ---
    pub tick: u64,
    pub parameters: Vec<ParameterReport>,

    /// One banner per parameter that is currently CRITICAL.
    pub alerts: Vec<String>,

    pub notifications: Vec<DispatchOutcome>,
    pub audio: Option<AudioCue>,
}

impl TickReport {
    pub fn phase(&self, parameter: Parameter) -> AlertPhase {
        self.parameters[parameter.index()].phase
    }
}

#[derive(Debug, Default)]
pub struct AlertEngine {
    // ---
    board: AlertBoard,
    alarm: AudibleAlarm,
    ticks: u64,
}

impl AlertEngine {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(&self) -> &AlertBoard {
        &self.board
    }

    pub fn alarm_mut(&mut self) -> &mut AudibleAlarm {
        &mut self.alarm
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run the full pipeline for one sample.
    pub fn tick(
        &mut self,
        sample: &Sample,
        transport: &dyn MailTransport,
        location: &str,
        sound_allowed: bool,
    ) -> TickReport {
        // ---
        let pending = self.begin_tick(sample, location);
        let deliveries = pending.deliver(transport);
        self.finish_tick(pending, deliveries, sound_allowed)
    }

    /// Classify `sample`, step the state machines and compose the alert
    /// mails this tick owes. Attempts are recorded here, so the mails must be
    /// delivered before the next tick begins.
    pub fn begin_tick(&mut self, sample: &Sample, location: &str) -> PendingTick {
        // ---
        self.ticks += 1;
        let tick = self.ticks;

        let statuses = classify_sample(sample);
        let transitions = self.board.apply(&statuses, sample.timestamp());
        let alerts = prepare(&mut self.board, sample, tick, location);

        PendingTick {
            tick,
            sample: sample.clone(),
            statuses,
            transitions,
            alerts,
        }
    }

    /// Record delivery results, evaluate the alarm and build the report.
    pub fn finish_tick(
        &mut self,
        pending: PendingTick,
        deliveries: Vec<Delivery>,
        sound_allowed: bool,
    ) -> TickReport {
        // ---
        let PendingTick {
            tick,
            sample,
            statuses,
            transitions,
            ..
        } = pending;

        let notifications = record(&mut self.board, deliveries);

        let audio = self
            .alarm
            .evaluate(self.board.any_active(), sound_allowed, sample.timestamp());

        let parameters: Vec<ParameterReport> = Parameter::ALL
            .iter()
            .map(|p| {
                let d = p.descriptor();
                let status = statuses[p.index()];
                ParameterReport {
                    parameter: *p,
                    label: d.label,
                    unit: d.unit,
                    value: sample.value(*p),
                    severity: status.severity,
                    status: status.label,
                    phase: self.board.state(*p).phase(),
                    transition: transitions[p.index()],
                }
            })
            .collect();

        let alerts = self
            .board
            .active()
            .map(|p| {
                let d = p.descriptor();
                format!(
                    "{} {} (Current: {} {})",
                    d.label,
                    d.threshold_text(),
                    sample.value(p),
                    d.unit
                )
            })
            .collect();

        tracing::debug!(
            "Tick {} complete: active={} notified={} audio={}",
            tick,
            self.board.active().count(),
            notifications.iter().filter(|n| n.delivered).count(),
            audio.is_some()
        );

        TickReport {
            tick,
            parameters,
            alerts,
            notifications,
            audio,
        }
    }
}

/// First half of a tick: state already stepped, alert mails not yet sent.
#[derive(Debug)]
pub struct PendingTick {
    // ---
    tick: u64,
    sample: Sample,
    statuses: [ParameterStatus; Parameter::COUNT],
    transitions: [Transition; Parameter::COUNT],
    alerts: Vec<PendingAlert>,
}

impl PendingTick {
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn alerts(&self) -> &[PendingAlert] {
        &self.alerts
    }

    /// Submit every composed mail, one at a time.
    pub fn deliver(&self, transport: &dyn MailTransport) -> Vec<Delivery> {
        self.alerts.iter().map(|a| a.send(transport)).collect()
    }
}
