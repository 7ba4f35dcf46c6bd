use crate::{
    auth::AuthenticatedUser,
    db::Database,
    error::AppError,
    models::{
        reminder::REMINDER_COLUMNS, NewReminder, Reminder, ReminderQuery, ReminderStatus,
        ReminderUpdate, SnoozeRequest, UpcomingQuery,
    },
    response::{ApiResponse, Page, Pagination},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_UPCOMING_HOURS: i64 = 24;

/// An empty body means "use the defaults"; anything else must be valid JSON.
fn parse_snooze(body: &[u8]) -> Result<SnoozeRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SnoozeRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn ensure_future(remind_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
    if remind_at <= now {
        return Err(AppError::invalid("Reminder time must be in the future"));
    }
    Ok(())
}

async fn ensure_item_owned(db: &Database, item_id: Uuid, user_id: i32) -> Result<(), AppError> {
    let owned: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1 AND user_id = $2)")
            .bind(item_id)
            .bind(user_id)
            .fetch_one(db.pool())
            .await?;
    if !owned {
        return Err(AppError::NotFound("Item not found".into()));
    }
    Ok(())
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    user_id: i32,
    status: Option<ReminderStatus>,
) {
    builder.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status);
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Reminder not found".into())
}

/// Lists the caller's reminders ordered by trigger time.
///
/// ## Query Parameters:
/// - `status` (optional): `active` or `completed`.
/// - `page`, `limit` (optional): pagination, default 1 and 10.
#[get("")]
pub async fn get_reminders(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    query: web::Query<ReminderQuery>,
) -> Result<impl Responder, AppError> {
    query.validate()?;
    let (page, limit, offset) = Pagination::resolve(query.page, query.limit)?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reminders");
    push_filters(&mut count, user.id(), query.status);
    let total = count.build_query_scalar::<i64>().fetch_one(db.pool()).await?;

    let mut select =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM reminders", REMINDER_COLUMNS));
    push_filters(&mut select, user.id(), query.status);
    select
        .push(" ORDER BY remind_at ASC, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let reminders = select.build_query_as::<Reminder>().fetch_all(db.pool()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Reminders retrieved",
        Page {
            items: reminders,
            pagination: Pagination::new(page, limit, total),
        },
    )))
}

/// Active reminders due within the next `hours` hours (default 24).
#[get("/upcoming")]
pub async fn get_upcoming(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    query: web::Query<UpcomingQuery>,
) -> Result<impl Responder, AppError> {
    query.validate()?;
    let now = Utc::now();
    let until = now + Duration::hours(query.hours.unwrap_or(DEFAULT_UPCOMING_HOURS));

    let sql = format!(
        "SELECT {} FROM reminders \
         WHERE user_id = $1 AND status = 'active' AND remind_at > $2 AND remind_at <= $3 \
         ORDER BY remind_at ASC",
        REMINDER_COLUMNS
    );
    let reminders = sqlx::query_as::<_, Reminder>(&sql)
        .bind(user.id())
        .bind(now)
        .bind(until)
        .fetch_all(db.pool())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Upcoming reminders retrieved", reminders)))
}

#[get("/active")]
pub async fn get_active(
    db: web::Data<Database>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM reminders WHERE user_id = $1 AND status = $2 ORDER BY remind_at ASC",
        REMINDER_COLUMNS
    );
    let reminders = sqlx::query_as::<_, Reminder>(&sql)
        .bind(user.id())
        .bind(ReminderStatus::Active)
        .fetch_all(db.pool())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Active reminders retrieved", reminders)))
}

#[get("/{id}")]
pub async fn get_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM reminders WHERE id = $1 AND user_id = $2",
        REMINDER_COLUMNS
    );
    let reminder = sqlx::query_as::<_, Reminder>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(not_found)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Reminder retrieved", reminder)))
}

/// Creates a reminder. `remind_at` must be in the future and a linked item
/// must belong to the caller.
#[post("")]
pub async fn create_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    reminder_data: web::Json<NewReminder>,
) -> Result<impl Responder, AppError> {
    reminder_data.validate()?;
    ensure_future(reminder_data.remind_at, Utc::now())?;
    if let Some(item_id) = reminder_data.item_id {
        ensure_item_owned(&db, item_id, user.id()).await?;
    }

    let reminder = Reminder::new(reminder_data.into_inner(), user.id());
    let sql = format!(
        "INSERT INTO reminders (id, user_id, item_id, title, message, remind_at, anchor_at, \
            recurrence, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
        REMINDER_COLUMNS
    );
    let created = sqlx::query_as::<_, Reminder>(&sql)
        .bind(reminder.id)
        .bind(reminder.user_id)
        .bind(reminder.item_id)
        .bind(reminder.title)
        .bind(reminder.message)
        .bind(reminder.remind_at)
        .bind(reminder.anchor_at)
        .bind(reminder.recurrence)
        .bind(reminder.status)
        .bind(reminder.created_at)
        .bind(reminder.updated_at)
        .fetch_one(db.pool())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok("Reminder created", created)))
}

/// Partially updates a reminder. A new `remind_at` must be in the future and
/// becomes the anchor for any recurrence.
#[put("/{id}")]
pub async fn update_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    reminder_data: web::Json<ReminderUpdate>,
) -> Result<impl Responder, AppError> {
    reminder_data.validate()?;
    if let Some(remind_at) = reminder_data.remind_at {
        ensure_future(remind_at, Utc::now())?;
    }
    let update = reminder_data.into_inner();

    let sql = format!(
        "UPDATE reminders SET \
            title = COALESCE($3, title), \
            message = COALESCE($4, message), \
            remind_at = COALESCE($5, remind_at), \
            anchor_at = COALESCE($5, anchor_at), \
            recurrence = COALESCE($6, recurrence), \
            updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 RETURNING {}",
        REMINDER_COLUMNS
    );
    let updated = sqlx::query_as::<_, Reminder>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .bind(update.title.map(|t| t.trim().to_string()))
        .bind(update.message)
        .bind(update.remind_at)
        .bind(update.recurrence)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(not_found)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Reminder updated", updated)))
}

#[put("/{id}/complete")]
pub async fn complete_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "UPDATE reminders SET status = $3, completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 RETURNING {}",
        REMINDER_COLUMNS
    );
    let completed = sqlx::query_as::<_, Reminder>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .bind(ReminderStatus::Completed)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(not_found)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Reminder completed", completed)))
}

/// Postpones a reminder by `minutes` (default 10) from now and reactivates it.
/// The body may be empty.
#[put("/{id}/snooze")]
pub async fn snooze_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> Result<impl Responder, AppError> {
    let snooze = parse_snooze(&body)?;
    snooze.validate()?;
    let remind_at = Utc::now() + Duration::minutes(snooze.minutes());

    let sql = format!(
        "UPDATE reminders SET remind_at = $3, snooze_count = snooze_count + 1, status = $4, \
            completed_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 RETURNING {}",
        REMINDER_COLUMNS
    );
    let snoozed = sqlx::query_as::<_, Reminder>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .bind(remind_at)
        .bind(ReminderStatus::Active)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(not_found)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        format!("Reminder snoozed for {} minutes", snooze.minutes()),
        snoozed,
    )))
}

#[delete("/{id}")]
pub async fn delete_reminder(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM reminders WHERE id = $1 AND user_id = $2")
        .bind(path.into_inner())
        .bind(user.id())
        .execute(db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Reminder deleted")))
}

/// `/upcoming` and `/active` are registered ahead of `/{id}`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_upcoming)
        .service(get_active)
        .service(get_reminders)
        .service(create_reminder)
        .service(get_reminder)
        .service(update_reminder)
        .service(complete_reminder)
        .service(snooze_reminder)
        .service(delete_reminder);
}
