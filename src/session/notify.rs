use tokio::sync::mpsc::UnboundedSender;

use crate::error::ApiFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// User-facing notification (toast) emitted by session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    #[must_use]
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, description)
    }

    #[must_use]
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, description)
    }

    #[must_use]
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, description)
    }

    fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Notification for a failed backend call, keyed on its status code.
    #[must_use]
    pub fn for_api_failure(failure: &ApiFailure) -> Self {
        match failure.status_code {
            401 => Self::error(
                "Not authorized",
                "Your session has expired. Please sign in again.",
            ),
            403 => Self::error(
                "Access denied",
                "You do not have permission to perform this action.",
            ),
            404 => Self::error(
                "Not found",
                non_empty(&failure.message, "The requested resource does not exist."),
            ),
            500 => Self::error(
                "Server error",
                "Something went wrong on the server. Please try again later.",
            ),
            status => Self::error(
                format!("Error {status}"),
                non_empty(&failure.message, "An unexpected error occurred."),
            ),
        }
    }
}

fn non_empty(message: &str, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_owned()
    } else {
        message.to_owned()
    }
}

/// Consumer-provided notification sink.
///
/// # Example
///
/// ```rust,ignore
/// struct Toasts(Sender<Notification>);
///
/// impl Notifier for Toasts {
///     fn notify(&self, notification: Notification) {
///         let _ = self.0.try_send(notification);
///     }
/// }
/// ```
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

impl Notifier for UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => tracing::warn!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
            _ => tracing::info!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
        }
    }
}

/// Location change requested by the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Push a client route onto history.
    Push(String),
    /// Replace the visible location without adding a history entry.
    Replace(String),
    /// Full-page navigation away from the application.
    External(url::Url),
}

/// Consumer-provided router.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, to: Navigation);
}

impl Navigator for UnboundedSender<Navigation> {
    fn navigate(&self, to: Navigation) {
        if self.send(to).is_err() {
            tracing::debug!("Navigation receiver dropped");
        }
    }
}
