use futures::future::BoxFuture;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;
use std::sync::Arc;

use crate::config::SmtpConfig;
use crate::error::TransportError;

pub const REPORT_SUBJECT: &str = "Automated Report";
pub const REPORT_BODY: &str = "Please find the attached automated report.";
pub const ALERT_SUBJECT: &str = "PDF Generation Alert";
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutgoingMail) -> BoxFuture<'_, Result<(), TransportError>>;
}

fn build_message(mail: OutgoingMail) -> Result<Message, TransportError> {
    let from: Mailbox = mail.from.parse()?;
    let to: Mailbox = mail.to.parse()?;
    let builder = Message::builder().from(from).to(to).subject(mail.subject);

    let message = match mail.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| TransportError::ContentType(attachment.content_type.clone()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(mail.body))
                    .singlepart(
                        Attachment::new(attachment.filename).body(attachment.bytes, content_type),
                    ),
            )?
        }
        None => builder.header(ContentType::TEXT_PLAIN).body(mail.body)?,
    };
    Ok(message)
}

/// STARTTLS SMTP relay. Each message opens its own authenticated connection, which is
/// closed once the send finishes or fails.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { transport })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: OutgoingMail) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let message = build_message(mail)?;
            self.transport.send(message).await?;
            Ok(())
        })
    }
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    report_to: String,
    alert_to: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, config: &SmtpConfig) -> Self {
        Self {
            mailer,
            from: config.username.clone(),
            report_to: config.receiver.clone(),
            alert_to: config.alert_receiver.clone(),
        }
    }

    pub async fn send_report(&self, path: &Path) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.pdf".to_string());

        self.mailer
            .send(OutgoingMail {
                from: self.from.clone(),
                to: self.report_to.clone(),
                subject: REPORT_SUBJECT.to_string(),
                body: REPORT_BODY.to_string(),
                attachment: Some(MailAttachment {
                    filename,
                    content_type: PDF_CONTENT_TYPE.to_string(),
                    bytes,
                }),
            })
            .await?;
        tracing::info!(path = %path.display(), to = %self.report_to, "report email sent");
        Ok(())
    }

    /// Best-effort: a failed alert is logged and dropped.
    pub async fn send_alert(&self, message: &str) {
        let result = self
            .mailer
            .send(OutgoingMail {
                from: self.from.clone(),
                to: self.alert_to.clone(),
                subject: ALERT_SUBJECT.to_string(),
                body: format!("An error occurred: {message}"),
                attachment: None,
            })
            .await;
        match result {
            Ok(()) => tracing::info!(to = %self.alert_to, "alert email sent"),
            Err(err) => tracing::error!(error = %err, alert = message, "failed to send alert email"),
        }
    }
}
