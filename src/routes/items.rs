use crate::{
    auth::AuthenticatedUser,
    db::Database,
    error::AppError,
    models::{
        item::{normalize_tags, ITEM_COLUMNS},
        Comment, Item, ItemDetail, ItemQuery, ItemUpdate, LikeToggle, NewComment, NewItem,
        NewNotification, NotificationKind,
    },
    response::{ApiResponse, Page, Pagination},
    routes::notifications::create_notification,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::Serialize;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

const OPEN_STATUSES: &str = "status IN ('pending', 'in_progress')";

/// Escapes `LIKE` wildcards and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: i32, query: &ItemQuery) {
    builder.push(" WHERE user_id = ").push_bind(user_id);

    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = query.priority {
        builder.push(" AND priority = ").push_bind(priority);
    }
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        builder.push(" AND category = ").push_bind(category.to_lowercase());
    }
    if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        builder
            .push(" AND ")
            .push_bind(tag.to_lowercase())
            .push(" = ANY(tags)");
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    match query.overdue {
        Some(true) => {
            builder.push(format!(" AND due_date < NOW() AND {}", OPEN_STATUSES));
        }
        Some(false) => {
            builder.push(format!(
                " AND NOT (due_date IS NOT NULL AND due_date < NOW() AND {})",
                OPEN_STATUSES
            ));
        }
        None => {}
    }
}

/// Fetches an item the caller may read: their own, or any public item.
async fn find_visible_item(db: &Database, item_id: Uuid, user_id: i32) -> Result<Item, AppError> {
    let sql = format!(
        "SELECT {} FROM items WHERE id = $1 AND (user_id = $2 OR is_public)",
        ITEM_COLUMNS
    );
    sqlx::query_as::<_, Item>(&sql)
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))
}

/// Retrieves the authenticated user's items.
///
/// ## Query Parameters:
/// - `status`, `priority`, `category`, `tag` (optional): exact-match filters.
/// - `search` (optional): case-insensitive match on title and description.
/// - `overdue` (optional): only (or no) open items past their due date.
/// - `page`, `limit` (optional): pagination, default 1 and 10, limit at most 100.
/// - `sort_by`, `order` (optional): default `created_at` / `desc`.
///
/// ## Responses:
/// - `200 OK`: items plus pagination metadata.
/// - `400 Bad Request`: invalid query values.
/// - `401 Unauthorized`: missing or invalid token.
#[get("")]
pub async fn get_items(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    query: web::Query<ItemQuery>,
) -> Result<impl Responder, AppError> {
    query.validate()?;
    let (page, limit, offset) = Pagination::resolve(query.page, query.limit)?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items");
    push_filters(&mut count, user.id(), &query);
    let total = count.build_query_scalar::<i64>().fetch_one(db.pool()).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM items", ITEM_COLUMNS));
    push_filters(&mut select, user.id(), &query);
    // Sort column and direction come from closed enums, never from raw input.
    select.push(format!(
        " ORDER BY {} {} NULLS LAST, id",
        query.sort_by.column(),
        query.order.keyword()
    ));
    select
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let items = select.build_query_as::<Item>().fetch_all(db.pool()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Items retrieved",
        Page {
            items,
            pagination: Pagination::new(page, limit, total),
        },
    )))
}

#[derive(Debug, FromRow)]
struct ItemTotals {
    total: i64,
    completed: i64,
    overdue: i64,
    due_soon: i64,
    average_progress: f64,
}

/// Aggregates returned by `GET /api/items/stats/overview`.
#[derive(Debug, Serialize)]
pub struct ItemStats {
    pub total: i64,
    pub completed: i64,
    pub overdue: i64,
    pub due_this_week: i64,
    pub average_progress: f64,
    pub completion_rate: f64,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
}

/// Percentage of completed items, rounded to two decimals.
fn completion_rate(completed: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 10_000.0).round() / 100.0
}

async fn count_by(
    db: &Database,
    user_id: i32,
    column: &'static str,
) -> Result<BTreeMap<String, i64>, AppError> {
    let sql = format!(
        "SELECT {col}::text, COUNT(*) FROM items WHERE user_id = $1 GROUP BY {col}",
        col = column
    );
    let rows = sqlx::query_as::<_, (String, i64)>(&sql)
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.into_iter().collect())
}

#[get("/stats/overview")]
pub async fn get_stats(
    db: web::Data<Database>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
            COUNT(*) FILTER (WHERE {open} AND due_date < NOW()) AS overdue, \
            COUNT(*) FILTER (WHERE {open} AND due_date >= NOW() \
                AND due_date <= NOW() + INTERVAL '7 days') AS due_soon, \
            COALESCE(AVG(progress)::float8, 0) AS average_progress \
         FROM items WHERE user_id = $1",
        open = OPEN_STATUSES
    );
    let totals = sqlx::query_as::<_, ItemTotals>(&sql)
        .bind(user.id())
        .fetch_one(db.pool())
        .await?;

    let stats = ItemStats {
        total: totals.total,
        completed: totals.completed,
        overdue: totals.overdue,
        due_this_week: totals.due_soon,
        average_progress: (totals.average_progress * 100.0).round() / 100.0,
        completion_rate: completion_rate(totals.completed, totals.total),
        by_status: count_by(&db, user.id(), "status").await?,
        by_priority: count_by(&db, user.id(), "priority").await?,
        by_category: count_by(&db, user.id(), "category").await?,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Statistics retrieved", stats)))
}

/// Retrieves one item with its comments and like information.
///
/// Public items of other users are readable; anything else is a 404.
#[get("/{id}")]
pub async fn get_item(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let item = find_visible_item(&db, path.into_inner(), user.id()).await?;

    let comments = sqlx::query_as::<_, Comment>(
        "SELECT c.id, c.item_id, c.user_id, u.username, c.body, c.created_at \
         FROM item_comments c JOIN users u ON u.id = c.user_id \
         WHERE c.item_id = $1 ORDER BY c.created_at",
    )
    .bind(item.id)
    .fetch_all(db.pool())
    .await?;

    let (likes, liked_by_me) = sqlx::query_as::<_, (i64, bool)>(
        "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM item_likes WHERE item_id = $1",
    )
    .bind(item.id)
    .bind(user.id())
    .fetch_one(db.pool())
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Item retrieved",
        ItemDetail {
            item,
            comments,
            likes,
            liked_by_me,
        },
    )))
}

/// Creates a new item owned by the authenticated user.
///
/// ## Responses:
/// - `201 Created`: the stored item.
/// - `400 Bad Request`: validation failed; `errors` lists every failing rule.
#[post("")]
pub async fn create_item(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    item_data: web::Json<NewItem>,
) -> Result<impl Responder, AppError> {
    item_data.validate()?;
    let item = Item::new(item_data.into_inner(), user.id());

    let sql = format!(
        "INSERT INTO items (id, user_id, title, description, category, priority, status, tags, \
            due_date, progress, is_public, created_at, updated_at, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING {}",
        ITEM_COLUMNS
    );
    let created = sqlx::query_as::<_, Item>(&sql)
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.title)
        .bind(item.description)
        .bind(item.category)
        .bind(item.priority)
        .bind(item.status)
        .bind(item.tags)
        .bind(item.due_date)
        .bind(item.progress)
        .bind(item.is_public)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.completed_at)
        .fetch_one(db.pool())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok("Item created", created)))
}

/// Partially updates an item. Only the owner may update.
///
/// Moving into `completed` stamps `completed_at`; moving out of it clears it.
#[put("/{id}")]
pub async fn update_item(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    item_data: web::Json<ItemUpdate>,
) -> Result<impl Responder, AppError> {
    item_data.validate()?;
    let update = item_data.into_inner();

    let sql = format!(
        "UPDATE items SET \
            title = COALESCE($3, title), \
            description = COALESCE($4, description), \
            category = COALESCE($5, category), \
            priority = COALESCE($6, priority), \
            status = COALESCE($7, status), \
            tags = COALESCE($8, tags), \
            due_date = COALESCE($9, due_date), \
            progress = COALESCE($10, progress), \
            is_public = COALESCE($11, is_public), \
            completed_at = CASE \
                WHEN COALESCE($7, status) = 'completed' THEN COALESCE(completed_at, NOW()) \
                ELSE NULL END, \
            updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 \
         RETURNING {}",
        ITEM_COLUMNS
    );
    let updated = sqlx::query_as::<_, Item>(&sql)
        .bind(path.into_inner())
        .bind(user.id())
        .bind(update.title.map(|t| t.trim().to_string()))
        .bind(update.description)
        .bind(update.category.map(|c| c.trim().to_lowercase()))
        .bind(update.priority)
        .bind(update.status)
        .bind(update.tags.map(normalize_tags))
        .bind(update.due_date)
        .bind(update.progress)
        .bind(update.is_public)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Item updated", updated)))
}

#[delete("/{id}")]
pub async fn delete_item(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM items WHERE id = $1 AND user_id = $2")
        .bind(path.into_inner())
        .bind(user.id())
        .execute(db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Item not found".into()));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Item deleted")))
}

/// Adds a comment to a visible item and notifies the owner when the
/// commenter is someone else.
#[post("/{id}/comments")]
pub async fn add_comment(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    comment_data: web::Json<NewComment>,
) -> Result<impl Responder, AppError> {
    comment_data.validate()?;
    let item = find_visible_item(&db, path.into_inner(), user.id()).await?;

    let mut tx = db.pool().begin().await?;
    let comment = sqlx::query_as::<_, Comment>(
        "WITH inserted AS ( \
            INSERT INTO item_comments (id, item_id, user_id, body) VALUES ($1, $2, $3, $4) \
            RETURNING id, item_id, user_id, body, created_at) \
         SELECT i.id, i.item_id, i.user_id, u.username, i.body, i.created_at \
         FROM inserted i JOIN users u ON u.id = i.user_id",
    )
    .bind(Uuid::new_v4())
    .bind(item.id)
    .bind(user.id())
    .bind(comment_data.text.trim())
    .fetch_one(&mut *tx)
    .await?;

    if item.user_id != user.id() {
        let notification = NewNotification::new(
            item.user_id,
            NotificationKind::Comment,
            format!("New comment on \"{}\"", item.title),
            format!("{} commented: {}", comment.username, comment.body),
        )
        .for_item(item.id);
        create_notification(&mut *tx, notification).await?;
    }
    tx.commit().await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok("Comment added", comment)))
}

/// Likes a visible item, or removes the caller's like if present.
#[post("/{id}/like")]
pub async fn toggle_like(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let item = find_visible_item(&db, path.into_inner(), user.id()).await?;

    let mut tx = db.pool().begin().await?;
    let removed = sqlx::query("DELETE FROM item_likes WHERE item_id = $1 AND user_id = $2")
        .bind(item.id)
        .bind(user.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let liked = removed == 0;
    if liked {
        sqlx::query(
            "INSERT INTO item_likes (item_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(item.id)
        .bind(user.id())
        .execute(&mut *tx)
        .await?;

        if item.user_id != user.id() {
            let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
                .bind(user.id())
                .fetch_one(&mut *tx)
                .await?;
            let notification = NewNotification::new(
                item.user_id,
                NotificationKind::Like,
                format!("New like on \"{}\"", item.title),
                format!("{} liked your item", username),
            )
            .for_item(item.id);
            create_notification(&mut *tx, notification).await?;
        }
    }

    let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_likes WHERE item_id = $1")
        .bind(item.id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    let message = if liked { "Item liked" } else { "Like removed" };
    Ok(HttpResponse::Ok().json(ApiResponse::ok(message, LikeToggle { liked, likes })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_stats)
        .service(get_items)
        .service(create_item)
        .service(get_item)
        .service(update_item)
        .service(delete_item)
        .service(add_comment)
        .service(toggle_like);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("report"), "%report%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.33);
        assert_eq!(completion_rate(4, 4), 100.0);
    }

    #[test]
    fn test_filters_bind_in_order() {
        let query: ItemQuery = serde_json::from_str(
            r#"{"status":"pending","tag":" Work ","search":"plan","overdue":true}"#,
        )
        .unwrap();
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items");
        push_filters(&mut builder, 7, &query);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM items WHERE user_id = $1 AND status = $2 AND $3 = ANY(tags) \
             AND (title ILIKE $4 OR description ILIKE $5) \
             AND due_date < NOW() AND status IN ('pending', 'in_progress')"
        );
    }
}
