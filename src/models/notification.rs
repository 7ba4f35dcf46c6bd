use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

pub const NOTIFICATION_COLUMNS: &str =
    "id, user_id, item_id, reminder_id, kind, title, message, is_read, read_at, created_at";

/// What produced a notification.
/// Corresponds to the `notification_kind` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reminder,
    Comment,
    Like,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: i32,
    pub item_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be stored.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i32,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub item_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: i32,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: truncate(title.into(), 200),
            message: message.into(),
            item_id: None,
            reminder_id: None,
        }
    }

    pub fn for_item(mut self, item_id: Uuid) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn for_reminder(mut self, reminder_id: Uuid) -> Self {
        self.reminder_id = Some(reminder_id);
        self
    }
}

fn truncate(mut value: String, max_chars: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
    value
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub kind: Option<NotificationKind>,
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
}
