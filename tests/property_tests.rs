//! Property tests for the alert pipeline invariants.

use chrono::{DateTime, Duration, Local, TimeZone};
use parking_lot::Mutex;
use proptest::prelude::*;

use envwatch::alerts::{classify, AlertEngine, AlertPhase, AudibleAlarm, Severity, Transition};
use envwatch::history::{HistoryWindow, HISTORY_LEN};
use envwatch::models::Direction;
use envwatch::{MailError, MailTransport, OutgoingMail, Parameter, Sample};

// ---

/// Succeeds or fails according to a flag set before each tick; counts calls.
#[derive(Default)]
struct SwitchMailer {
    fail: Mutex<bool>,
    calls: Mutex<usize>,
}

impl SwitchMailer {
    fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl MailTransport for SwitchMailer {
    fn send(&self, _mail: &OutgoingMail) -> Result<(), MailError> {
        *self.calls.lock() += 1;
        if *self.fail.lock() {
            Err(MailError::Transport("relay unavailable".into()))
        } else {
            Ok(())
        }
    }
}

fn at(tick: usize) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(tick as i64)
}

fn arb_parameter() -> impl Strategy<Value = Parameter> {
    proptest::sample::select(Parameter::ALL.to_vec())
}

/// Values spread around every threshold in the table.
fn arb_reading() -> impl Strategy<Value = f64> {
    prop_oneof![
        -100.0f64..2000.0,
        proptest::sample::select(vec![26.0, 34.0, 60.0, 70.0, 990.0, 1000.0, 800.0, 1200.0, 35.0, 55.0]),
    ]
}

fn arb_readings() -> impl Strategy<Value = [f64; Parameter::COUNT]> {
    proptest::array::uniform6(arb_reading())
}

proptest! {
    /// Every reading of every parameter gets a severity and a label
    /// from that parameter's table row.
    #[test]
    fn classification_is_total(p in arb_parameter(), v in any::<f64>()) {
        let status = classify(p, v);
        prop_assert!(p.descriptor().status_labels.contains(&status.label));
        if v.is_nan() {
            prop_assert_eq!(status.severity, Severity::Normal);
        }
    }

    /// Severity never decreases moving into the dangerous direction.
    #[test]
    fn classification_is_monotone(p in arb_parameter(), a in arb_reading(), b in arb_reading()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (s_lo, s_hi) = (classify(p, lo).severity, classify(p, hi).severity);
        match p.descriptor().direction {
            Direction::High => prop_assert!(s_lo <= s_hi),
            Direction::Low => prop_assert!(s_lo >= s_hi),
            Direction::Informational => {
                prop_assert_eq!(s_lo, Severity::Normal);
                prop_assert_eq!(s_hi, Severity::Normal);
            }
        }
    }

    /// After any replay the phase mirrors the last classification, and
    /// every clearing step leaves the latch down.
    #[test]
    fn state_machine_tracks_last_sample(trace in proptest::collection::vec(arb_readings(), 1..40)) {
        let mailer = SwitchMailer::default();
        let mut engine = AlertEngine::new();

        for (i, readings) in trace.iter().enumerate() {
            let report = engine.tick(&Sample::new(at(i), *readings), &mailer, "Lab", true);

            for p in Parameter::ALL {
                let critical = classify(p, readings[p.index()]).severity == Severity::Critical;
                let state = engine.board().state(p);
                prop_assert_eq!(state.phase() == AlertPhase::Active, critical);
                prop_assert!(!state.latched() || state.is_active());
                if report.parameters[p.index()].transition == Transition::Cleared {
                    prop_assert!(!state.latched());
                }
            }
        }
    }

    /// One submission per episode when delivery succeeds; with failures,
    /// one submission per ACTIVE tick until the first success.
    #[test]
    fn at_most_one_notification_per_episode(
        trace in proptest::collection::vec((prop::bool::weighted(0.6), prop::bool::weighted(0.3)), 1..60)
    ) {
        let mailer = SwitchMailer::default();
        let mut engine = AlertEngine::new();
        let mut latched = false;
        let mut expected = 0usize;

        for (i, (critical, fail)) in trace.iter().enumerate() {
            let mut readings = [25.0, 50.0, 1005.0, 600.0, 20.0, 40.0];
            readings[Parameter::Temperature.index()] = if *critical { 36.0 } else { 25.0 };
            mailer.set_failing(*fail);

            let before = mailer.calls();
            engine.tick(&Sample::new(at(i), readings), &mailer, "Lab", true);
            let attempts = mailer.calls() - before;

            if *critical {
                if latched {
                    prop_assert_eq!(attempts, 0);
                } else {
                    prop_assert_eq!(attempts, 1);
                    expected += 1;
                    latched = !*fail;
                }
            } else {
                prop_assert_eq!(attempts, 0);
                latched = false;
            }
            prop_assert_eq!(engine.board().state(Parameter::Temperature).latched(), latched);
        }
        prop_assert_eq!(mailer.calls(), expected);
    }

    /// A cue is emitted exactly when something is ACTIVE and sound is on.
    #[test]
    fn audio_gate(trace in proptest::collection::vec((arb_readings(), any::<bool>()), 1..30)) {
        let mailer = SwitchMailer::default();
        let mut engine = AlertEngine::new();

        for (i, (readings, sound)) in trace.iter().enumerate() {
            let report = engine.tick(&Sample::new(at(i), *readings), &mailer, "Lab", *sound);
            let any_active = engine.board().any_active();
            prop_assert_eq!(report.audio.is_some(), any_active && *sound);
        }
    }

    /// Nonces never repeat, even within the same millisecond.
    #[test]
    fn audio_nonces_are_unique(n in 1usize..50) {
        let mut alarm = AudibleAlarm::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..n {
            let cue = alarm.cue(at(0));
            prop_assert!(seen.insert(cue.nonce));
        }
    }

    /// The window never exceeds its bound and keeps the newest samples in
    /// insertion order.
    #[test]
    fn history_is_bounded(temps in proptest::collection::vec(0.0f64..50.0, 0..100)) {
        let mut window = HistoryWindow::default();
        for (i, t) in temps.iter().enumerate() {
            window.push(Sample::new(at(i), [*t, 50.0, 1005.0, 600.0, 20.0, 40.0]));
            prop_assert!(window.len() <= HISTORY_LEN);
        }

        let kept: Vec<f64> = window.iter().map(|s| s.value(Parameter::Temperature)).collect();
        let skip = temps.len().saturating_sub(HISTORY_LEN);
        prop_assert_eq!(kept, temps[skip..].to_vec());
    }
}
