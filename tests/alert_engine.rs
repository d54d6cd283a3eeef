//! End-to-end scenarios for the alert pipeline: threshold evaluation, state
//! machine, mail dispatch and the audible alarm, driven tick by tick.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Local, TimeZone};
use parking_lot::Mutex;

use envwatch::alerts::{AlertEngine, AlertPhase};
use envwatch::{MailError, MailTransport, OutgoingMail, Parameter, Sample};

// ---

/// Records every submission and fails according to a script.
#[derive(Default)]
struct ScriptedMailer {
    sent: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<bool>>,
}

impl ScriptedMailer {
    fn failing(times: usize) -> Self {
        let mailer = Self::default();
        mailer.failures.lock().extend(std::iter::repeat(true).take(times));
        mailer
    }

    fn attempts(&self) -> usize {
        self.sent.lock().len()
    }

    fn subjects(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl MailTransport for ScriptedMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().push(mail.subject.clone());
        if self.failures.lock().pop_front().unwrap_or(false) {
            Err(MailError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

const NOMINAL: [f64; Parameter::COUNT] = [25.0, 50.0, 1005.0, 600.0, 20.0, 40.0];

fn at(tick: i64) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(2 * tick)
}

fn sample_with(tick: i64, overrides: &[(Parameter, f64)]) -> Sample {
    let mut readings = NOMINAL;
    for (p, v) in overrides {
        readings[p.index()] = *v;
    }
    Sample::new(at(tick), readings)
}

/// Run one parameter through `values`; returns phase per tick and the number
/// of mails submitted on each tick.
fn replay(
    parameter: Parameter,
    values: &[f64],
    mailer: &ScriptedMailer,
    sound_allowed: bool,
) -> (Vec<AlertPhase>, Vec<usize>, usize) {
    // ---
    let mut engine = AlertEngine::new();
    let mut phases = Vec::new();
    let mut per_tick = Vec::new();
    let mut cues = 0;

    for (i, v) in values.iter().enumerate() {
        let before = mailer.attempts();
        let report = engine.tick(
            &sample_with(i as i64, &[(parameter, *v)]),
            mailer,
            "Lab",
            sound_allowed,
        );
        phases.push(report.phase(parameter));
        per_tick.push(mailer.attempts() - before);
        cues += usize::from(report.audio.is_some());
    }
    (phases, per_tick, cues)
}

use AlertPhase::{Active as A, Normal as N};

#[test]
fn temperature_episode_notifies_once() {
    // ---
    let mailer = ScriptedMailer::default();
    let (phases, per_tick, _) = replay(
        Parameter::Temperature,
        &[30.0, 33.9, 34.1, 35.0, 33.9, 26.0],
        &mailer,
        true,
    );

    assert_eq!(phases, vec![N, N, A, A, N, N]);
    assert_eq!(per_tick, vec![0, 0, 1, 0, 0, 0]);
    assert_eq!(mailer.subjects(), vec!["[CRITICAL] Temperature alert".to_string()]);
}

#[test]
fn pressure_alerts_on_the_low_side() {
    // ---
    let mailer = ScriptedMailer::default();
    let (phases, per_tick, _) = replay(
        Parameter::Pressure,
        &[1005.0, 995.0, 989.0, 985.0, 995.0, 1010.0],
        &mailer,
        true,
    );

    assert_eq!(phases, vec![N, N, A, A, N, N]);
    assert_eq!(per_tick, vec![0, 0, 1, 0, 0, 0]);
}

#[test]
fn co_activation_sends_one_mail_per_parameter() {
    // ---
    let mailer = ScriptedMailer::default();
    let mut engine = AlertEngine::new();

    let report = engine.tick(
        &sample_with(0, &[(Parameter::Temperature, 35.0), (Parameter::Co2, 1300.0)]),
        &mailer,
        "Lab",
        true,
    );

    assert_eq!(report.notifications.len(), 2);
    assert!(report.notifications.iter().all(|n| n.delivered));
    let mut subjects = mailer.subjects();
    subjects.sort();
    assert_eq!(
        subjects,
        vec![
            "[CRITICAL] CO₂ Level alert".to_string(),
            "[CRITICAL] Temperature alert".to_string(),
        ]
    );
    assert_eq!(report.alerts.len(), 2);
    assert!(report.audio.is_some());
}

#[test]
fn flapping_notifies_on_every_entry() {
    // ---
    let mailer = ScriptedMailer::default();
    let (phases, per_tick, _) = replay(
        Parameter::Temperature,
        &[34.1, 33.9, 34.1, 33.9],
        &mailer,
        true,
    );

    assert_eq!(phases, vec![A, N, A, N]);
    assert_eq!(per_tick, vec![1, 0, 1, 0]);
    assert_eq!(mailer.attempts(), 2);
}

#[test]
fn transport_failures_retry_until_success() {
    // ---
    let mailer = ScriptedMailer::failing(3);
    let mut engine = AlertEngine::new();

    for tick in 0..6 {
        let report = engine.tick(
            &sample_with(tick, &[(Parameter::Humidity, 80.0)]),
            &mailer,
            "Lab",
            true,
        );
        let latched = engine.board().state(Parameter::Humidity).latched();

        match tick {
            0..=2 => {
                assert_eq!(report.notifications.len(), 1);
                assert!(!report.notifications[0].delivered);
                assert!(report.notifications[0].message.contains("connection refused"));
                assert!(!latched);
            }
            3 => {
                assert!(report.notifications[0].delivered);
                assert!(latched);
            }
            _ => assert!(report.notifications.is_empty()),
        }
    }

    assert_eq!(mailer.attempts(), 4);
}

#[test]
fn muted_sound_still_sends_mail() {
    // ---
    let mailer = ScriptedMailer::default();
    let (phases, per_tick, cues) = replay(
        Parameter::Pm25,
        &[60.0, 70.0, 65.0],
        &mailer,
        false,
    );

    assert_eq!(phases, vec![A, A, A]);
    assert_eq!(per_tick.iter().sum::<usize>(), 1);
    assert_eq!(cues, 0);
}

#[test]
fn noise_never_alerts() {
    // ---
    let mailer = ScriptedMailer::default();
    let (phases, _, cues) = replay(Parameter::Noise, &[85.0, 120.0, f64::NAN], &mailer, true);

    assert_eq!(phases, vec![N, N, N]);
    assert_eq!(mailer.attempts(), 0);
    assert_eq!(cues, 0);
}
