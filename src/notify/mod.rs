//! Alert notification.
//!
//! A `Notifier` delivers a subject, a body and an optional image attachment to
//! one recipient. Delivery is synchronous and reports `Delivery::Failed`
//! instead of erroring, so the frame loop can log the failure and carry on.

mod dry_run;
#[cfg(feature = "notify-smtp")]
mod smtp;

use std::path::PathBuf;

use anyhow::Result;
use image::RgbImage;

use crate::config::SmtpSettings;
use crate::frame::write_jpeg;

pub use dry_run::LogNotifier;
#[cfg(feature = "notify-smtp")]
pub use smtp::SmtpNotifier;

/// Subject and body of an alert message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// One outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

/// Result of a send attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

pub trait Notifier {
    /// Notifier identifier.
    fn name(&self) -> &'static str;

    /// Deliver `notification`, blocking until the delivery service answers.
    fn send(&mut self, notification: &Notification) -> Delivery;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn send(&mut self, notification: &Notification) -> Delivery {
        (**self).send(notification)
    }
}

/// Notifier for a run: the log-only notifier when `dry_run` is set,
/// otherwise SMTP. Without the `notify-smtp` feature there is no way to
/// deliver mail, so anything but a dry run is refused.
pub fn build_notifier(smtp: &SmtpSettings, recipient: &str, dry_run: bool) -> Result<Box<dyn Notifier>> {
    if dry_run {
        log::info!("dry run: alerts for {} are logged, not sent", recipient);
        return Ok(Box::new(LogNotifier::new()));
    }
    #[cfg(feature = "notify-smtp")]
    {
        let notifier = SmtpNotifier::new(smtp)?;
        log::info!("alerts go to {} via {}:{}", recipient, smtp.host, smtp.port);
        Ok(Box::new(notifier))
    }
    #[cfg(not(feature = "notify-smtp"))]
    {
        Err(anyhow::anyhow!(
            "cannot e-mail {} via {}: built without the notify-smtp feature; \
             rebuild with --features notify-smtp or pass --dry-run",
            recipient,
            smtp.host
        ))
    }
}

/// Send `message` to `recipient` with `image` attached as a JPEG.
///
/// The attachment lives in a temporary file that is removed when this
/// function returns, whether delivery succeeded, failed, or the file could
/// not be written.
pub fn dispatch_alert<N: Notifier + ?Sized>(
    notifier: &mut N,
    recipient: &str,
    message: &AlertMessage,
    image: &RgbImage,
) -> Delivery {
    let mut attachment = match tempfile::Builder::new()
        .prefix("busguard-alert-")
        .suffix(".jpg")
        .tempfile()
    {
        Ok(file) => file,
        Err(err) => return Delivery::Failed(format!("create alert attachment: {}", err)),
    };

    if let Err(err) = write_jpeg(image, attachment.as_file_mut()) {
        return Delivery::Failed(format!("write alert attachment: {:#}", err));
    }

    let notification = Notification {
        to: recipient.to_string(),
        subject: message.subject.clone(),
        body: message.body.clone(),
        attachment: Some(attachment.path().to_path_buf()),
    };
    notifier.send(&notification)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture {
        outcome: Delivery,
        seen: Vec<(Notification, bool)>,
    }

    impl Notifier for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        fn send(&mut self, notification: &Notification) -> Delivery {
            let exists = notification
                .attachment
                .as_ref()
                .is_some_and(|path| path.exists());
            self.seen.push((notification.clone(), exists));
            self.outcome.clone()
        }
    }

    fn message() -> AlertMessage {
        AlertMessage {
            subject: "alert".into(),
            body: "body".into(),
        }
    }

    #[test]
    fn attachment_exists_during_send_and_is_removed_after() {
        let mut capture = Capture {
            outcome: Delivery::Sent,
            seen: Vec::new(),
        };
        let delivery = dispatch_alert(&mut capture, "ops@example.com", &message(), &RgbImage::new(16, 9));

        assert_eq!(delivery, Delivery::Sent);
        let (notification, existed) = &capture.seen[0];
        assert!(existed);
        assert_eq!(notification.to, "ops@example.com");
        let path = notification.attachment.as_ref().unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(!path.exists());
    }

    #[test]
    fn attachment_is_removed_after_failed_send() {
        let mut capture = Capture {
            outcome: Delivery::Failed("smtp down".into()),
            seen: Vec::new(),
        };
        let delivery = dispatch_alert(&mut capture, "ops@example.com", &message(), &RgbImage::new(16, 9));

        assert_eq!(delivery, Delivery::Failed("smtp down".into()));
        let path = capture.seen[0].0.attachment.clone().unwrap();
        assert!(!path.exists());
    }

    fn smtp() -> SmtpSettings {
        SmtpSettings {
            host: "mail.example.com".into(),
            port: 587,
            username: None,
            password: None,
            sender: "busguard@localhost".into(),
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[test]
    fn dry_run_logs_instead_of_sending() {
        let notifier = build_notifier(&smtp(), "ops@example.com", true).unwrap();
        assert_eq!(notifier.name(), LogNotifier::new().name());
    }

    #[cfg(not(feature = "notify-smtp"))]
    #[test]
    fn live_run_without_smtp_support_is_refused() {
        let err = build_notifier(&smtp(), "ops@example.com", false)
            .err()
            .expect("no mail transport compiled in");
        let message = err.to_string();
        assert!(message.contains("notify-smtp"));
        assert!(message.contains("--dry-run"));
    }
}
