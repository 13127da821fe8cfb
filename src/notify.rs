//! User-visible status indicator and alerts
//!
//! The status notifier mirrors detector and conversation state onto a single
//! persistent platform notification.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::Result;
use crate::error::Permission;

/// Identifier the platform assigns to a scheduled notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationId(pub String);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which indicator is being shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    /// Waiting for the wake phrase
    Listening,
    /// Wake phrase heard, conversation running
    Activated,
}

/// A persistent notification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Indicator this notification represents
    pub kind: IndicatorKind,
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// Whether the user can swipe it away
    pub persistent: bool,
}

impl Notification {
    /// Indicator shown while waiting for the wake phrase
    #[must_use]
    pub fn listening(assistant_name: &str) -> Self {
        Self {
            kind: IndicatorKind::Listening,
            title: format!("{assistant_name} is listening"),
            body: format!("Say \"Hey {assistant_name}\" to start a conversation"),
            persistent: true,
        }
    }

    /// Indicator shown once the assistant has been woken
    #[must_use]
    pub fn activated(assistant_name: &str) -> Self {
        Self {
            kind: IndicatorKind::Activated,
            title: format!("{assistant_name} is here"),
            body: "I'm hearing you now".to_string(),
            persistent: true,
        }
    }
}

/// Platform notification service
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Ask for permission to post notifications, returning whether it was granted
    async fn request_permission(&self) -> bool;

    /// Post a notification
    async fn schedule(&self, notification: &Notification) -> Result<NotificationId>;

    /// Remove a posted notification
    async fn dismiss(&self, id: &NotificationId) -> Result<()>;
}

/// Something the user must be told about directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// A permission the assistant needs was refused
    PermissionDenied(Permission),
}

/// External collaborator that shows alerts to the user
pub trait AlertSink: Send + Sync {
    /// Show an alert
    fn alert(&self, alert: Alert);
}

/// Alert sink that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, alert: Alert) {
        match alert {
            Alert::PermissionDenied(permission) => {
                tracing::warn!(%permission, "permission required: enable it in system settings");
            }
        }
    }
}

/// Owns the single status notification slot
#[derive(Clone)]
pub struct StatusNotifier {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<dyn NotificationService>,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    current: Option<(NotificationId, IndicatorKind)>,
    granted: bool,
}

impl StatusNotifier {
    /// Create a notifier over a platform service
    #[must_use]
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Show the "listening for wake phrase" indicator
    pub async fn show_listening(&self, assistant_name: &str) {
        self.show(Notification::listening(assistant_name)).await;
    }

    /// Show the "activated" indicator
    pub async fn show_activated(&self, assistant_name: &str) {
        self.show(Notification::activated(assistant_name)).await;
    }

    /// Dismiss the current indicator; safe to call when nothing is shown
    pub async fn hide(&self) {
        let mut slot = self.inner.slot.lock().await;
        self.clear(&mut slot).await;
    }

    /// Kind of indicator currently shown
    pub async fn current(&self) -> Option<IndicatorKind> {
        self.inner.slot.lock().await.current.as_ref().map(|(_, kind)| *kind)
    }

    async fn show(&self, notification: Notification) {
        // The slot stays locked for dismiss + schedule so concurrent shows serialize
        let mut slot = self.inner.slot.lock().await;

        // Only a grant is remembered; a denial is asked again on the next show
        if !slot.granted {
            slot.granted = self.inner.service.request_permission().await;
            if !slot.granted {
                tracing::debug!("notification permission denied");
                return;
            }
        }

        self.clear(&mut slot).await;

        match self.inner.service.schedule(&notification).await {
            Ok(id) => {
                tracing::debug!(%id, kind = ?notification.kind, "status notification shown");
                slot.current = Some((id, notification.kind));
            }
            Err(e) => tracing::warn!(error = %e, "failed to show status notification"),
        }
    }

    async fn clear(&self, slot: &mut Slot) {
        if let Some((id, kind)) = slot.current.take() {
            if let Err(e) = self.inner.service.dismiss(&id).await {
                tracing::warn!(%id, error = %e, "failed to dismiss status notification");
            } else {
                tracing::debug!(%id, ?kind, "status notification dismissed");
            }
        }
    }
}
