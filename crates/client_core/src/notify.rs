#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Moved,
    MoveCommitError,
    LoadError,
    Created,
    Updated,
    Archived,
    Deleted,
    EditError,
}

/// A toast-style message for the user. Dismissable, never blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            kind,
            message: message.into(),
        }
    }

    pub fn error(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

/// Fire-and-forget outlet for notifications; rendering is the sink's concern.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct MissingNotifier;

impl NotificationSink for MissingNotifier {
    fn notify(&self, _notification: Notification) {}
}

impl<F> NotificationSink for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}
