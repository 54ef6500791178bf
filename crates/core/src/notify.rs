use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    WarningIssued,
    RefundCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarningIssued => "warning_issued",
            Self::RefundCompleted => "refund_completed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: UserId,
    pub subject: String,
    pub correlation_id: String,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        recipient: UserId,
        subject: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            recipient,
            subject: subject.into(),
            correlation_id: correlation_id.into(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outbound delivery is someone else's job; workflows only announce.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            event_name = "notify.dispatch.logged",
            correlation_id = %notification.correlation_id,
            kind = notification.kind.as_str(),
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification recorded"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryNotifier, Notification, NotificationKind, Notifier};
    use crate::domain::user::UserId;

    #[test]
    fn in_memory_notifier_records_in_order() {
        let notifier = InMemoryNotifier::default();
        notifier.notify(
            Notification::new(
                NotificationKind::WarningIssued,
                UserId("emp-1".to_owned()),
                "late for shift",
                "req-1",
            )
            .with_metadata("warningId", "wrn-1"),
        );
        notifier.notify(Notification::new(
            NotificationKind::RefundCompleted,
            UserId("emp-2".to_owned()),
            "refund settled",
            "req-2",
        ));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].metadata.get("warningId").map(String::as_str), Some("wrn-1"));
        assert_eq!(sent[1].kind, NotificationKind::RefundCompleted);
    }
}
