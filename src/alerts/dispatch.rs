//! Notification dispatcher.
//!
//! Once per tick, every ACTIVE parameter whose latch is still clear gets one
//! mail. Success sets the latch; failure leaves it clear so the next tick
//! retries. Delivery is best effort, one message per parameter, no batching.

use serde::Serialize;

use super::state::AlertBoard;
use crate::error::MailError;
use crate::mail::{MailTransport, OutgoingMail};
use crate::models::{format_local, Parameter, Sample};

// ---

/// Result of one delivery attempt, rendered as a banner by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub parameter: Parameter,
    pub delivered: bool,
    pub message: String,
}

/// An alert mail composed for the current tick and not yet submitted.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    pub parameter: Parameter,
    pub mail: OutgoingMail,
}

impl PendingAlert {
    pub fn send(&self, transport: &dyn MailTransport) -> Delivery {
        Delivery {
            parameter: self.parameter,
            result: transport.send(&self.mail),
        }
    }
}

/// Transport result for one [`PendingAlert`].
#[derive(Debug)]
pub struct Delivery {
    pub parameter: Parameter,
    pub result: Result<(), MailError>,
}

/// Compose one mail per ACTIVE, unlatched parameter and record the attempt
/// for `tick`. Calling this again within the same tick returns nothing.
pub fn prepare(board: &mut AlertBoard, sample: &Sample, tick: u64, location: &str) -> Vec<PendingAlert> {
    // ---
    let pending: Vec<Parameter> = board
        .active()
        .filter(|p| board.state(*p).wants_notification(tick))
        .collect();

    pending
        .into_iter()
        .map(|parameter| {
            board.state_mut(parameter).record_attempt(tick);
            PendingAlert {
                parameter,
                mail: compose_alert(parameter, sample, location),
            }
        })
        .collect()
}

/// Apply transport results: success sets the latch, failure leaves it clear.
pub fn record(board: &mut AlertBoard, deliveries: Vec<Delivery>) -> Vec<DispatchOutcome> {
    // ---
    deliveries
        .into_iter()
        .map(|Delivery { parameter, result }| {
            let label = parameter.descriptor().label;
            match result {
                Ok(()) => {
                    board.state_mut(parameter).mark_notified();
                    DispatchOutcome {
                        parameter,
                        delivered: true,
                        message: format!("Alert email sent for {}", label),
                    }
                }
                Err(e) => {
                    tracing::warn!("Alert mail for {} failed: {}", parameter.key(), e);
                    DispatchOutcome {
                        parameter,
                        delivered: false,
                        message: format!("Failed to send email alert for {}: {}", label, e),
                    }
                }
            }
        })
        .collect()
}

/// [`prepare`], send and [`record`] in one call, for callers that hold the
/// board for the whole submission.
pub struct NotificationDispatcher<'a> {
    // ---
    transport: &'a dyn MailTransport,
    location: &'a str,
}

impl<'a> NotificationDispatcher<'a> {
    // ---
    pub fn new(transport: &'a dyn MailTransport, location: &'a str) -> Self {
        Self {
            transport,
            location,
        }
    }

    /// Deliver pending notifications for `tick`. Calling this again within
    /// the same tick does nothing.
    pub fn dispatch(&self, board: &mut AlertBoard, sample: &Sample, tick: u64) -> Vec<DispatchOutcome> {
        // ---
        let deliveries = prepare(board, sample, tick, self.location)
            .iter()
            .map(|pending| pending.send(self.transport))
            .collect();
        record(board, deliveries)
    }
}

/// Build the alert mail for a parameter from the current sample.
pub fn compose_alert(parameter: Parameter, sample: &Sample, location: &str) -> OutgoingMail {
    // ---
    let d = parameter.descriptor();
    let value = sample.value(parameter);

    let subject = format!("[CRITICAL] {} alert", d.label);
    let body = format!(
        "{label} crossed its critical limit!\n\n\
         Parameter: {label}\n\
         Current Value: {value} {unit}\n\
         Time: {time}\n\
         Location: {location}\n\
         Threshold: {threshold}\n\n\
         {advice}\n",
        label = d.label,
        value = value,
        unit = d.unit,
        time = format_local(&sample.timestamp()),
        location = location,
        threshold = d.threshold_text(),
        advice = d.advice,
    );

    OutgoingMail::new(subject, body)
}
