//! Per-login session state and the registry that owns it.
//!
//! A session bundles everything one dashboard user mutates: the alert
//! engine, the trend window, sound and refresh settings, the seeded daily
//! history and the report log. Sessions share nothing but the registry map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local};
use parking_lot::{Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerts::{
    air_quality, AlertEngine, AudioCue, Delivery, DispatchOutcome, ParameterReport, PendingTick,
};
use crate::analytics::{seed_history, DailyRecord, HISTORY_DAYS};
use crate::history::HistoryWindow;
use crate::mail::MailTransport;
use crate::models::{format_local, Parameter, Sample, SamplePoint};
use crate::reports::ReportLog;
use crate::source::{RandomSampleSource, SampleSource};

// ---

/// Default for how long a session survives without a request.
pub const DEFAULT_IDLE_MINUTES: u32 = 30;

/// Shown once per session when alerts cannot be mailed.
pub const MAIL_NOT_CONFIGURED: &str =
    "Email notifications are not configured. Alerts are shown on the dashboard only.";

/// Dashboard polling interval. Only the values offered by the page are
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RefreshRate(u32);

impl RefreshRate {
    pub const ALLOWED: [u32; 5] = [1, 2, 3, 5, 10];

    pub fn secs(self) -> u32 {
        self.0
    }
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self(2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRefreshRate(u32);

impl fmt::Display for InvalidRefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not a refresh rate, expected one of {:?}",
            self.0,
            RefreshRate::ALLOWED
        )
    }
}

impl std::error::Error for InvalidRefreshRate {}

impl TryFrom<u32> for RefreshRate {
    type Error = InvalidRefreshRate;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&secs) {
            Ok(Self(secs))
        } else {
            Err(InvalidRefreshRate(secs))
        }
    }
}

impl From<RefreshRate> for u32 {
    fn from(rate: RefreshRate) -> u32 {
        rate.0
    }
}

/// JSON view returned by one dashboard poll.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    // ---
    pub tick: u64,
    pub timestamp: String,
    pub location: String,
    pub parameters: Vec<ParameterReport>,
    pub alerts: Vec<String>,
    pub notifications: Vec<DispatchOutcome>,
    pub audio: Option<AudioCue>,
    pub air_quality: &'static str,

    /// Parameters whose alert mail went out during the current episode.
    pub emails_sent: usize,

    pub notice: Option<String>,
    pub history: Vec<SamplePoint>,
    pub sound_allowed: bool,
    pub refresh_rate: RefreshRate,
}

pub struct Session {
    // ---
    id: Uuid,
    username: String,
    engine: AlertEngine,
    history: HistoryWindow,
    source: Box<dyn SampleSource>,
    daily: Vec<DailyRecord>,
    reports: ReportLog,
    mail_notice_shown: bool,
    pub sound_allowed: bool,
    pub refresh_rate: RefreshRate,
}

impl Session {
    // ---
    /// New session with a random sample source and freshly seeded history.
    pub fn new(username: impl Into<String>, refresh_rate: RefreshRate, now: DateTime<Local>) -> Self {
        let mut rng = StdRng::from_entropy();
        let daily = seed_history(&mut rng, now.date_naive(), HISTORY_DAYS);
        Self::with_source(
            username,
            refresh_rate,
            Box::new(RandomSampleSource::from_entropy()),
            daily,
        )
    }

    pub fn with_source(
        username: impl Into<String>,
        refresh_rate: RefreshRate,
        source: Box<dyn SampleSource>,
        daily: Vec<DailyRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            engine: AlertEngine::new(),
            history: HistoryWindow::default(),
            source,
            daily,
            reports: ReportLog::default(),
            mail_notice_shown: false,
            sound_allowed: true,
            refresh_rate,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.history.latest()
    }

    pub fn daily(&self) -> &[DailyRecord] {
        &self.daily
    }

    pub fn reports(&self) -> &ReportLog {
        &self.reports
    }

    pub fn reports_mut(&mut self) -> &mut ReportLog {
        &mut self.reports
    }

    /// Test alarm button: a cue when sound is allowed, alert state untouched.
    pub fn test_alarm(&mut self, now: DateTime<Local>) -> Option<AudioCue> {
        if self.sound_allowed {
            Some(self.engine.alarm_mut().cue(now))
        } else {
            None
        }
    }

    /// Pull one sample and run it through the alert pipeline, submitting
    /// alert mails while `self` is borrowed.
    pub fn tick(
        &mut self,
        transport: &dyn MailTransport,
        location: &str,
        now: DateTime<Local>,
    ) -> DashboardView {
        // ---
        let pending = self.begin_tick(location, now);
        let deliveries = pending.deliver(transport);
        self.finish_tick(pending, deliveries, transport.is_configured(), location)
    }

    /// Pull one sample, record it and step the alert state. The returned
    /// mails are delivered by the caller, who may release the session first.
    pub fn begin_tick(&mut self, location: &str, now: DateTime<Local>) -> PendingTick {
        // ---
        let sample = self.source.next_sample(now);
        self.history.push(sample.clone());
        self.engine.begin_tick(&sample, location)
    }

    /// Apply delivery results and build the dashboard view. The sound setting
    /// is read here, so a mute issued while mail was in flight already counts.
    pub fn finish_tick(
        &mut self,
        pending: PendingTick,
        deliveries: Vec<Delivery>,
        mail_configured: bool,
        location: &str,
    ) -> DashboardView {
        // ---
        let sample = pending.sample().clone();
        let report = self
            .engine
            .finish_tick(pending, deliveries, self.sound_allowed);

        let notice = if !mail_configured
            && !self.mail_notice_shown
            && !report.notifications.is_empty()
        {
            self.mail_notice_shown = true;
            Some(MAIL_NOT_CONFIGURED.to_string())
        } else {
            None
        };

        DashboardView {
            tick: report.tick,
            timestamp: format_local(&sample.timestamp()),
            location: location.to_string(),
            parameters: report.parameters,
            alerts: report.alerts,
            notifications: report.notifications,
            audio: report.audio,
            air_quality: air_quality(sample.value(Parameter::Pm25)),
            emails_sent: self.engine.board().latched_count(),
            notice,
            history: self.history.iter().map(SamplePoint::from).collect(),
            sound_allowed: self.sound_allowed,
            refresh_rate: self.refresh_rate,
        }
    }
}

/// A registered session: its state, a gate that serializes ticks, and the
/// time of the last authenticated request.
///
/// The state lock is only ever held for in-memory work. Mail submission
/// happens with the state unlocked, so settings, the test alarm and exports
/// never wait on a slow relay.
pub struct SessionHandle {
    // ---
    state: Mutex<Session>,
    ticking: Mutex<()>,
    last_seen: Mutex<DateTime<Local>>,
}

impl SessionHandle {
    // ---
    pub fn new(session: Session, now: DateTime<Local>) -> Self {
        Self {
            state: Mutex::new(session),
            ticking: Mutex::new(()),
            last_seen: Mutex::new(now),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, Session>> {
        self.state.try_lock()
    }

    pub fn touch(&self, now: DateTime<Local>) {
        *self.last_seen.lock() = now;
    }

    pub fn last_seen(&self) -> DateTime<Local> {
        *self.last_seen.lock()
    }

    /// One dashboard tick. Ticks of one session never overlap; the state is
    /// unlocked while the tick's alert mails are submitted.
    pub fn tick(
        &self,
        transport: &dyn MailTransport,
        location: &str,
        now: DateTime<Local>,
    ) -> DashboardView {
        // ---
        let _ticking = self.ticking.lock();
        let pending = self.state.lock().begin_tick(location, now);
        let deliveries = pending.deliver(transport);
        self.state
            .lock()
            .finish_tick(pending, deliveries, transport.is_configured(), location)
    }
}

pub type SharedSession = Arc<SessionHandle>;

/// Registry of live sessions keyed by token.
///
/// Sessions end on logout or after `idle_timeout` without a request. Idle
/// sessions are dropped lazily, on lookup and whenever a new one is
/// registered.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, SharedSession>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::minutes(i64::from(DEFAULT_IDLE_MINUTES)))
    }
}

impl SessionStore {
    // ---
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Register `session` and return its token.
    pub fn insert(&self, session: Session, now: DateTime<Local>) -> Uuid {
        // ---
        self.evict_idle(now);
        let id = session.id();
        self.inner
            .lock()
            .insert(id, Arc::new(SessionHandle::new(session, now)));
        tracing::info!("Session {} created ({} live)", id, self.len());
        id
    }

    /// Look up a session without refreshing it.
    pub fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.inner.lock().get(id).cloned()
    }

    /// Look up a session for a request made at `now`. An idle session is
    /// dropped instead of returned.
    pub fn resolve(&self, id: &Uuid, now: DateTime<Local>) -> Option<SharedSession> {
        // ---
        let handle = self.get(id)?;
        if self.is_idle(&handle, now) {
            self.remove(id);
            return None;
        }
        handle.touch(now);
        Some(handle)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.inner.lock().remove(id).is_some();
        if removed {
            tracing::info!("Session {} dropped", id);
        }
        removed
    }

    /// Drop every session idle at `now`; returns how many went.
    pub fn evict_idle(&self, now: DateTime<Local>) -> usize {
        // ---
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|id, handle| {
            let keep = !self.is_idle(handle, now);
            if !keep {
                tracing::info!("Session {} expired", id);
            }
            keep
        });
        before - map.len()
    }

    fn is_idle(&self, handle: &SessionHandle, now: DateTime<Local>) -> bool {
        now - handle.last_seen() > self.idle_timeout
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::MailError;
    use crate::mail::{NoopMailer, OutgoingMail};
    use chrono::TimeZone;

    /// Replays a fixed list of temperatures, everything else nominal.
    struct Scripted {
        temps: Vec<f64>,
        next: usize,
    }

    impl SampleSource for Scripted {
        fn next_sample(&mut self, at: DateTime<Local>) -> Sample {
            let t = self.temps[self.next % self.temps.len()];
            self.next += 1;
            Sample::new(at, [t, 50.0, 1005.0, 600.0, 20.0, 40.0])
        }
    }

    struct AlwaysOk;

    impl MailTransport for AlwaysOk {
        fn send(&self, _mail: &OutgoingMail) -> Result<(), MailError> {
            Ok(())
        }
    }

    fn session(temps: &[f64]) -> Session {
        Session::with_source(
            "admin",
            RefreshRate::default(),
            Box::new(Scripted {
                temps: temps.to_vec(),
                next: 0,
            }),
            Vec::new(),
        )
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_refresh_rate_values() {
        // ---
        assert_eq!(RefreshRate::try_from(5).unwrap().secs(), 5);
        assert!(RefreshRate::try_from(4).is_err());
        assert_eq!(RefreshRate::default().secs(), 2);

        let rate: RefreshRate = serde_json::from_str("10").unwrap();
        assert_eq!(rate.secs(), 10);
        assert!(serde_json::from_str::<RefreshRate>("7").is_err());
        assert_eq!(serde_json::to_string(&rate).unwrap(), "10");
    }

    #[test]
    fn test_tick_builds_view() {
        // ---
        let mut s = session(&[35.0]);
        let view = s.tick(&AlwaysOk, "Lab", now());

        assert_eq!(view.tick, 1);
        assert_eq!(view.location, "Lab");
        assert_eq!(view.parameters[Parameter::Temperature.index()].status, "High");
        assert_eq!(view.alerts.len(), 1);
        assert_eq!(view.emails_sent, 1);
        assert_eq!(view.air_quality, "Good");
        assert_eq!(view.history.len(), 1);
        assert!(view.audio.is_some());
        assert!(view.notice.is_none());
    }

    #[test]
    fn test_history_capped_at_twenty() {
        // ---
        let mut s = session(&[25.0]);
        let mut view = s.tick(&AlwaysOk, "Lab", now());
        for _ in 0..29 {
            view = s.tick(&AlwaysOk, "Lab", now());
        }
        assert_eq!(view.history.len(), 20);
        assert_eq!(s.history().len(), 20);
    }

    #[test]
    fn test_mail_notice_shown_once() {
        // ---
        let mut s = session(&[35.0, 25.0, 35.0]);
        let first = s.tick(&NoopMailer, "Lab", now());
        s.tick(&NoopMailer, "Lab", now());
        let third = s.tick(&NoopMailer, "Lab", now());

        assert_eq!(first.notice.as_deref(), Some(MAIL_NOT_CONFIGURED));
        assert_eq!(third.notifications.len(), 1);
        assert!(third.notice.is_none());
    }

    #[test]
    fn test_muted_session() {
        // ---
        let mut s = session(&[35.0]);
        s.sound_allowed = false;

        assert!(s.tick(&AlwaysOk, "Lab", now()).audio.is_none());
        assert!(s.test_alarm(now()).is_none());

        s.sound_allowed = true;
        assert!(s.test_alarm(now()).is_some());
        assert!(s.engine().board().any_active());
    }

    #[test]
    fn test_store_roundtrip() {
        // ---
        let store = SessionStore::default();
        let id = store.insert(session(&[25.0]), now());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().lock().username(), "admin");
        assert!(store.remove(&id));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_idle_sessions_expire() {
        // ---
        let store = SessionStore::new(Duration::minutes(10));
        let stale = store.insert(session(&[25.0]), now());
        let active = store.insert(session(&[25.0]), now());

        let later = now() + Duration::minutes(8);
        assert!(store.resolve(&active, later).is_some());

        // A reload logs in again without logging out.
        let fresh = store.insert(session(&[25.0]), now() + Duration::minutes(11));
        assert!(store.get(&stale).is_none());
        assert!(store.get(&active).is_some());
        assert!(store.get(&fresh).is_some());
        assert_eq!(store.len(), 2);

        assert!(store.resolve(&active, later + Duration::minutes(11)).is_none());
        assert!(store.get(&active).is_none());
        assert_eq!(store.evict_idle(now() + Duration::hours(1)), 1);
        assert!(store.is_empty());
    }

    /// Fails every send, and checks whether the session it belongs to is
    /// locked at that moment.
    struct LockCheckingMailer {
        handle: SharedSession,
        saw_unlocked: Mutex<Vec<bool>>,
    }

    impl MailTransport for LockCheckingMailer {
        fn send(&self, _mail: &OutgoingMail) -> Result<(), MailError> {
            let unlocked = self.handle.try_lock().is_some();
            self.saw_unlocked.lock().push(unlocked);
            Err(MailError::Transport("relay timed out".into()))
        }
    }

    #[test]
    fn test_state_unlocked_during_alert_mail() {
        // ---
        let handle: SharedSession = Arc::new(SessionHandle::new(session(&[35.0, 35.0]), now()));
        let mailer = LockCheckingMailer {
            handle: handle.clone(),
            saw_unlocked: Mutex::new(Vec::new()),
        };

        let first = handle.tick(&mailer, "Lab", now());
        handle.lock().sound_allowed = false;
        let second = handle.tick(&mailer, "Lab", now());

        assert_eq!(*mailer.saw_unlocked.lock(), vec![true, true]);
        assert!(!first.notifications[0].delivered);
        assert_eq!(second.notifications.len(), 1);
        assert!(first.audio.is_some());
        assert!(second.audio.is_none());
        assert!(!handle.lock().engine().board().state(Parameter::Temperature).latched());
    }
}
