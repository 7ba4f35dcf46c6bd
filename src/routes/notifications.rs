use actix_web::{delete, get, put, web, HttpResponse, Responder};
use serde_json::json;
use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    db::Database,
    error::AppError,
    models::{
        notification::NOTIFICATION_COLUMNS, NewNotification, Notification, NotificationQuery,
    },
    response::{ApiResponse, Pagination},
};

/// Stores a notification. Used by the item handlers and the reminder
/// dispatcher, so it accepts either a pool or an open transaction.
pub async fn create_notification<'e, E>(
    executor: E,
    notification: NewNotification,
) -> Result<Notification, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "INSERT INTO notifications (id, user_id, item_id, reminder_id, kind, title, message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        NOTIFICATION_COLUMNS
    );
    let created = sqlx::query_as::<_, Notification>(&sql)
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.item_id)
        .bind(notification.reminder_id)
        .bind(notification.kind)
        .bind(notification.title)
        .bind(notification.message)
        .fetch_one(executor)
        .await?;
    Ok(created)
}

async fn unread_count(db: &Database, user_id: i32) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
    )
    .bind(user_id)
    .fetch_one(db.pool())
    .await?;
    Ok(count)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: i32, query: &NotificationQuery) {
    builder.push(" WHERE user_id = ").push_bind(user_id);
    if query.unread_only {
        builder.push(" AND is_read = FALSE");
    }
    if let Some(kind) = query.kind {
        builder.push(" AND kind = ").push_bind(kind);
    }
}

/// Lists the caller's notifications, newest first.
///
/// ## Query Parameters:
/// - `unread_only` (optional): only unread notifications.
/// - `kind` (optional): `reminder`, `comment`, `like` or `system`.
/// - `page`, `limit` (optional): pagination, default 1 and 10.
#[get("")]
pub async fn get_notifications(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    query: web::Query<NotificationQuery>,
) -> Result<impl Responder, AppError> {
    query.validate()?;
    let (page, limit, offset) = Pagination::resolve(query.page, query.limit)?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
    push_filters(&mut count, user.id(), &query);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(db.pool()).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM notifications",
        NOTIFICATION_COLUMNS
    ));
    push_filters(&mut select, user.id(), &query);
    select
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let notifications = select
        .build_query_as::<Notification>()
        .fetch_all(db.pool())
        .await?;

    let unread = unread_count(&db, user.id()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Notifications retrieved",
        json!({
            "notifications": notifications,
            "pagination": Pagination::new(page, limit, total),
            "unread_count": unread,
        }),
    )))
}

#[get("/unread-count")]
pub async fn get_unread_count(
    db: web::Data<Database>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let count = unread_count(&db, user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Unread count retrieved",
        json!({ "unread_count": count }),
    )))
}

#[put("/mark-all-read")]
pub async fn mark_all_read(
    db: web::Data<Database>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE, read_at = NOW() \
         WHERE user_id = $1 AND is_read = FALSE",
    )
    .bind(user.id())
    .execute(db.pool())
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "All notifications marked as read",
        json!({ "updated": result.rows_affected() }),
    )))
}

/// Marks one notification as read. Already-read notifications keep their
/// original `read_at`.
#[put("/{id}/read")]
pub async fn mark_read(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, NOW()) \
         WHERE id = $1 AND user_id = $2 RETURNING {}",
        NOTIFICATION_COLUMNS
    );
    let notification = sqlx::query_as::<_, Notification>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".into()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Notification marked as read", notification)))
}

#[delete("/{id}")]
pub async fn delete_notification(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(path.into_inner())
        .bind(user.id())
        .execute(db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".into()));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Notification deleted")))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_notifications)
        .service(get_unread_count)
        .service(mark_all_read)
        .service(mark_read)
        .service(delete_notification);
}
