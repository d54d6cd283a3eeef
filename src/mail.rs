//! Mail transport boundary.
//!
//! The alert engine and the report page only see [`MailTransport`]. The SMTP
//! implementation submits synchronously over implicit TLS and opens a fresh
//! connection per message; when no SMTP relay is configured the service runs
//! with [`NoopMailer`], which logs and reports success.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::MailConfig;
use crate::error::MailError;

// ---

/// File attached to an outgoing mail.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// A plain-text message. An empty `to` list means the configured default
/// recipient.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

impl OutgoingMail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Synchronous, best-effort mail submission.
pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;

    /// False when this transport only pretends to deliver.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Stand-in used when no relay is configured; every send "succeeds".
#[derive(Debug, Default)]
pub struct NoopMailer;

impl MailTransport for NoopMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        // ---
        tracing::info!(
            "Mail not configured, dropping message: subject={:?}",
            mail.subject
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// SMTP relay transport.
pub struct SmtpMailer {
    // ---
    transport: SmtpTransport,
    sender: Mailbox,
    default_recipient: Mailbox,
}

impl SmtpMailer {
    /// Build a transport for the configured relay.
    pub fn new(cfg: &MailConfig) -> Result<Self, MailError> {
        // ---
        let sender = parse_mailbox(&cfg.sender)?;
        let default_recipient = parse_mailbox(&cfg.recipient)?;

        let transport = SmtpTransport::relay(&cfg.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(30)))
            .build();

        Ok(Self {
            transport,
            sender,
            default_recipient,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        // ---
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(mail.subject.clone());

        if mail.to.is_empty() {
            builder = builder.to(self.default_recipient.clone());
        } else {
            for to in &mail.to {
                builder = builder.to(parse_mailbox(to)?);
            }
        }

        let message = match &mail.attachment {
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(mail.body.clone()),
            Some(file) => {
                let content_type = ContentType::parse(file.content_type)
                    .map_err(|e| MailError::Message(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(mail.body.clone()))
                        .singlepart(
                            Attachment::new(file.filename.clone())
                                .body(file.bytes.clone(), content_type),
                        ),
                )
            }
        };

        message.map_err(|e| MailError::Message(e.to_string()))
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        // ---
        let message = self.build_message(mail)?;

        tracing::debug!("Submitting mail: subject={:?}", mail.subject);
        self.transport
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::info!("Mail sent: subject={:?}", mail.subject);

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|_| MailError::Address(address.to_string()))
}

/// Pick the transport for this process: SMTP when configured, otherwise the
/// no-op stand-in.
pub fn mailer_from_config(cfg: Option<&MailConfig>) -> Result<Box<dyn MailTransport>, MailError> {
    // ---
    match cfg {
        Some(mail_cfg) => Ok(Box::new(SmtpMailer::new(mail_cfg)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, alert mails will not be delivered");
            Ok(Box::new(NoopMailer))
        }
    }
}
