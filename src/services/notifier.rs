//! Background reminder dispatcher.
//!
//! Polls for due reminders, turns each into a `reminder` notification, and
//! periodically purges old read notifications. Runs as one tokio task owned
//! by the composition root through a `NotifierHandle`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{reminder::REMINDER_COLUMNS, NewNotification, NotificationKind, Reminder};
use crate::routes::notifications::create_notification;

/// Reminders handled per tick.
pub const DISPATCH_BATCH: i64 = 100;
const PURGE_EVERY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct NotificationService {
    db: Database,
    poll_interval: Duration,
    retention: ChronoDuration,
}

impl NotificationService {
    pub fn new(db: Database, poll_interval: Duration, retention_days: i64) -> Self {
        Self {
            db,
            poll_interval,
            retention: ChronoDuration::days(retention_days.max(0)),
        }
    }

    pub fn from_config(db: Database, config: &Config) -> Self {
        Self::new(
            db,
            config.notification_poll_interval,
            config.notification_retention_days,
        )
    }

    /// Fires every reminder due at `now`. Returns how many were dispatched.
    ///
    /// Each reminder is handled in its own transaction: the notification is
    /// stored and the reminder is marked fired (and rescheduled if it
    /// recurs) together.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let sql = format!(
            "SELECT {} FROM reminders \
             WHERE status = 'active' AND remind_at <= $1 \
               AND (last_triggered_at IS NULL OR last_triggered_at < remind_at) \
             ORDER BY remind_at ASC LIMIT $2",
            REMINDER_COLUMNS
        );
        let due = sqlx::query_as::<_, Reminder>(&sql)
            .bind(now)
            .bind(DISPATCH_BATCH)
            .fetch_all(self.db.pool())
            .await?;

        let mut dispatched = 0;
        for reminder in due {
            match self.fire(&reminder, now).await {
                Ok(()) => dispatched += 1,
                Err(e) => log::error!("Failed to dispatch reminder {}: {}", reminder.id, e),
            }
        }
        if dispatched > 0 {
            log::info!("Dispatched {} reminder notification(s)", dispatched);
        }
        Ok(dispatched)
    }

    async fn fire(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut tx = self.db.pool().begin().await?;

        let message = reminder
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Reminder: {}", reminder.title));
        let mut notification =
            NewNotification::new(reminder.user_id, NotificationKind::Reminder, &reminder.title, message)
                .for_reminder(reminder.id);
        if let Some(item_id) = reminder.item_id {
            notification = notification.for_item(item_id);
        }
        create_notification(&mut *tx, notification).await?;

        // Recurring reminders move to their next occurrence; one-off
        // reminders keep their time and are excluded by `last_triggered_at`.
        let next = reminder.next_trigger(now);
        sqlx::query(
            "UPDATE reminders SET last_triggered_at = $2, trigger_count = trigger_count + 1, \
                remind_at = COALESCE($3, remind_at), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(reminder.id)
        .bind(now)
        .bind(next)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes read notifications created before `cutoff`.
    pub async fn purge_read(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = TRUE AND created_at < $1")
                .bind(cutoff)
                .execute(self.db.pool())
                .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            log::info!("Purged {} read notification(s)", purged);
        }
        Ok(purged)
    }

    /// Spawns the polling loop.
    pub fn start(self) -> NotifierHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        log::info!(
            "Notification service started (poll every {:?})",
            self.poll_interval
        );
        let task = tokio::spawn(self.run(stop_rx));
        NotifierHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut purge = interval(PURGE_EVERY);
        purge.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.dispatch_due(Utc::now()).await {
                        log::error!("Reminder dispatch failed: {}", e);
                    }
                }
                _ = purge.tick() => {
                    let cutoff = Utc::now() - self.retention;
                    if let Err(e) = self.purge_read(cutoff).await {
                        log::error!("Notification purge failed: {}", e);
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Notification service stopped");
    }
}

/// Owner's handle on the running notifier.
#[derive(Debug)]
pub struct NotifierHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl NotifierHandle {
    /// Signals the loop to stop and waits for it to finish its current tick.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            log::warn!("Notification service task ended abnormally: {}", e);
        }
    }
}
