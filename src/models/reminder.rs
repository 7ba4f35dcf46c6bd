use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::not_blank;

pub const REMINDER_COLUMNS: &str = "id, user_id, item_id, title, message, remind_at, anchor_at, \
     recurrence, status, snooze_count, trigger_count, last_triggered_at, completed_at, \
     created_at, updated_at";

/// Upper bound on how many periods we will step through looking for the
/// next occurrence. Daily reminders left for ~270 years hit this.
const MAX_RECURRENCE_STEPS: u32 = 100_000;

/// How often a reminder repeats.
/// Corresponds to the `reminder_recurrence` SQL enum.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "reminder_recurrence", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Recurrence::None)
    }

    /// The `n`-th occurrence after `anchor`, or `None` for one-off reminders
    /// and out-of-range dates.
    fn nth_after(&self, anchor: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => anchor.checked_add_signed(Duration::days(i64::from(n))),
            Recurrence::Weekly => anchor.checked_add_signed(Duration::weeks(i64::from(n))),
            Recurrence::Monthly => anchor.checked_add_months(Months::new(n)),
            Recurrence::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// First occurrence of the schedule anchored at `anchor` that falls
    /// strictly after `after`.
    ///
    /// Occurrences are always computed from the anchor, so a monthly reminder
    /// anchored on the 31st lands on the last day of short months and returns
    /// to the 31st afterwards.
    pub fn next_after(
        &self,
        anchor: DateTime<Utc>,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.is_recurring() {
            return None;
        }
        if anchor > after {
            return Some(anchor);
        }
        // Jump close to the target for fixed-length periods before stepping.
        let start = match self {
            Recurrence::Daily => ((after - anchor).num_days().max(1)) as u32,
            Recurrence::Weekly => ((after - anchor).num_weeks().max(1)) as u32,
            _ => 1,
        };
        (start..start.saturating_add(MAX_RECURRENCE_STEPS))
            .filter_map(|n| self.nth_after(anchor, n))
            .find(|candidate| *candidate > after)
    }
}

/// Reminder lifecycle status.
/// Corresponds to the `reminder_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "reminder_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Active,
    Completed,
}

/// A scheduled reminder.
///
/// `remind_at` is the next time the reminder fires. `anchor_at` is the
/// schedule origin used to compute recurring occurrences.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: i32,
    pub item_id: Option<Uuid>,
    pub title: String,
    pub message: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub anchor_at: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub status: ReminderStatus,
    pub snooze_count: i32,
    pub trigger_count: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(input: NewReminder, user_id: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id: input.item_id,
            title: input.title.trim().to_string(),
            message: input.message,
            remind_at: input.remind_at,
            anchor_at: input.remind_at,
            recurrence: input.recurrence.unwrap_or_default(),
            status: ReminderStatus::Active,
            snooze_count: 0,
            trigger_count: 0,
            last_triggered_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Due when active, past its trigger time, and not yet fired for it.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Active
            && self.remind_at <= now
            && self.last_triggered_at.map_or(true, |fired| fired < self.remind_at)
    }

    /// Next `remind_at` after firing at `fired_at`, if the reminder repeats.
    pub fn next_trigger(&self, fired_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.recurrence.next_after(self.anchor_at, fired_at)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NewReminder {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "not_blank", message = "Title must not be blank")
    )]
    pub title: String,
    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    pub item_id: Option<Uuid>,
}

/// Partial update. A new `remind_at` also resets the recurrence anchor.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct ReminderUpdate {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "not_blank", message = "Title must not be blank")
    )]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: Option<String>,
    pub remind_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SnoozeRequest {
    #[validate(range(min = 1, max = 1440, message = "Snooze must be between 1 and 1440 minutes"))]
    pub minutes: Option<i64>,
}

impl SnoozeRequest {
    pub const DEFAULT_MINUTES: i64 = 10;

    pub fn minutes(&self) -> i64 {
        self.minutes.unwrap_or(Self::DEFAULT_MINUTES)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReminderQuery {
    pub status: Option<ReminderStatus>,
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpcomingQuery {
    #[validate(range(min = 1, max = 720, message = "Hours must be between 1 and 720"))]
    pub hours: Option<i64>,
}
