pub mod item;
pub mod notification;
pub mod reminder;
pub mod user;

use validator::ValidationError;

/// Rejects strings that are empty once surrounding whitespace is removed.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

pub use item::{
    Comment, Item, ItemDetail, ItemPriority, ItemQuery, ItemStatus, ItemUpdate, LikeToggle,
    NewComment, NewItem,
};
pub use notification::{NewNotification, Notification, NotificationKind, NotificationQuery};
pub use reminder::{
    NewReminder, Recurrence, Reminder, ReminderQuery, ReminderStatus, ReminderUpdate,
    SnoozeRequest, UpcomingQuery,
};
pub use user::{ChangePasswordRequest, ProfileUpdate, User};
