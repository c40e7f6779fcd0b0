use super::{Delivery, Notification, Notifier};

/// Notifier that only logs what it would have sent.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: u64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&mut self, notification: &Notification) -> Delivery {
        self.sent += 1;
        log::info!(
            "dry-run notification to={} subject={:?} attachment={}",
            notification.to,
            notification.subject,
            notification
                .attachment
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Delivery::Sent
    }
}
