//! Quick exports of the latest sample and the mails built around them.

use chrono::{DateTime, Local};

use crate::alerts::classify;
use crate::mail::{MailAttachment, OutgoingMail};
use crate::models::{format_local, Parameter, Sample};

use super::{fallback_pdf, PdfDocument};

// ---

/// One-row CSV of `sample`, header included.
pub fn sample_csv(sample: &Sample) -> String {
    // ---
    let header: Vec<&str> = std::iter::once("timestamp")
        .chain(Parameter::ALL.iter().map(|p| p.key()))
        .collect();
    let values: Vec<String> = std::iter::once(format_local(&sample.timestamp()))
        .chain(sample.iter().map(|(_, v)| v.to_string()))
        .collect();

    format!("{}\n{}\n", header.join(","), values.join(","))
}

/// Single page PDF listing every reading of `sample` with its status.
pub fn sample_pdf(sample: &Sample, location: &str) -> Vec<u8> {
    // ---
    let mut doc = PdfDocument::new();
    doc.title("Sensor Data Report");
    doc.paragraph(format!(
        "Location: {}\nTimestamp: {}",
        location,
        format_local(&sample.timestamp())
    ));
    doc.spacer(10.0);
    doc.heading("Readings");
    doc.paragraph(readings_text(sample));
    doc.footer("Report generated by Critical Space Monitoring System");

    doc.render().unwrap_or_else(|e| {
        tracing::error!("Sample PDF failed to render: {}", e);
        fallback_pdf(&readings_text(sample))
    })
}

fn readings_text(sample: &Sample) -> String {
    sample
        .iter()
        .map(|(p, v)| {
            let d = p.descriptor();
            format!("{}: {} {} ({})", d.label, v, d.unit, classify(p, v).label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Connectivity check mail.
pub fn test_mail(now: DateTime<Local>) -> OutgoingMail {
    OutgoingMail::new(
        "Test Email from Monitoring System",
        format!(
            "This is a test email from the Critical Space Monitoring System.\n\n\
             Sent at: {}\n\n\
             If you received this, mail notifications are working.",
            format_local(&now)
        ),
    )
}

/// Daily summary mail with the latest readings and the sample PDF attached.
pub fn daily_summary_mail(sample: &Sample, location: &str, now: DateTime<Local>) -> OutgoingMail {
    // ---
    let body = format!(
        "Daily Environmental Summary\n\n\
         Location: {}\n\
         Generated: {}\n\n\
         Latest readings:\n{}\n\n\
         The full report is attached.",
        location,
        format_local(&now),
        readings_text(sample)
    );

    let mut mail = OutgoingMail::new(
        format!("Daily Environmental Summary - {}", now.format("%Y-%m-%d")),
        body,
    );
    mail.attachment = Some(MailAttachment {
        filename: format!("daily_summary_{}.pdf", now.format("%Y%m%d")),
        content_type: "application/pdf",
        bytes: sample_pdf(sample, location),
    });
    mail
}
