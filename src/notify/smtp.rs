#![cfg(feature = "notify-smtp")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{Delivery, Notification, Notifier};
use crate::config::SmtpSettings;

/// Upper bound on attachment size read into memory.
const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// SMTP notifier (STARTTLS relay with optional login).
pub struct SmtpNotifier {
    sender: Mailbox,
    transport: SmtpTransport,
    host: String,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let sender: Mailbox = settings
            .sender
            .parse()
            .with_context(|| format!("invalid sender address '{}'", settings.sender))?;

        let mut builder = SmtpTransport::starttls_relay(&settings.host)
            .with_context(|| format!("configure SMTP relay {}", settings.host))?
            .port(settings.port)
            .timeout(Some(settings.timeout));
        match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (Some(username), None) => {
                log::warn!(
                    "SMTP username {} configured without BUSGUARD_SMTP_PASSWORD; sending unauthenticated",
                    username
                );
            }
            _ => {}
        }

        Ok(Self {
            sender,
            transport: builder.build(),
            host: settings.host.clone(),
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let to: Mailbox = notification
            .to
            .parse()
            .with_context(|| format!("invalid recipient address '{}'", notification.to))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(notification.body.clone()));
        if let Some(path) = &notification.attachment {
            body = body.singlepart(attachment_part(path)?);
        }

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(notification.subject.clone())
            .multipart(body)
            .context("build alert e-mail")
    }

    fn try_send(&self, notification: &Notification) -> Result<()> {
        let message = self.build_message(notification)?;
        self.transport
            .send(&message)
            .with_context(|| format!("SMTP delivery via {} failed", self.host))?;
        Ok(())
    }
}

fn attachment_part(path: &Path) -> Result<SinglePart> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("stat attachment {}", path.display()))?
        .len();
    if len > MAX_ATTACHMENT_BYTES {
        return Err(anyhow!(
            "attachment {} is {} bytes, limit is {}",
            path.display(),
            len,
            MAX_ATTACHMENT_BYTES
        ));
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("read attachment {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "alert.jpg".to_string());
    let content_type = ContentType::parse("image/jpeg").context("jpeg content type")?;
    Ok(Attachment::new(filename).body(bytes, content_type))
}

impl Notifier for SmtpNotifier {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn send(&mut self, notification: &Notification) -> Delivery {
        match self.try_send(notification) {
            Ok(()) => {
                log::info!("alert e-mail sent to {}", notification.to);
                Delivery::Sent
            }
            Err(err) => Delivery::Failed(format!("{:#}", err)),
        }
    }
}
