use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::not_blank;

/// Column list shared by every query that returns an `Item`.
pub const ITEM_COLUMNS: &str = "id, user_id, title, description, category, priority, status, tags, \
     due_date, progress, is_public, created_at, updated_at, completed_at";

/// Represents the priority of an item.
/// Corresponds to the `item_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "item_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Represents the lifecycle status of an item.
/// Corresponds to the `item_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not started yet.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned.
    Cancelled,
}

/// An item (task) as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: Uuid,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub priority: ItemPriority,
    pub status: ItemStatus,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub progress: i32,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Creates a new `Item` owned by `user_id` from validated input.
    pub fn new(input: NewItem, user_id: i32) -> Self {
        let now = Utc::now();
        let status = input.status.unwrap_or(ItemStatus::Pending);
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input
                .category
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "general".to_string()),
            priority: input.priority.unwrap_or(ItemPriority::Medium),
            status,
            tags: normalize_tags(input.tags.unwrap_or_default()),
            due_date: input.due_date,
            progress: input.progress.unwrap_or(0),
            is_public: input.is_public.unwrap_or(false),
            created_at: now,
            updated_at: now,
            completed_at: (status == ItemStatus::Completed).then_some(now),
        }
    }
}

/// Lowercases, trims and de-duplicates tags, preserving first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.trim().chars().count() > 30) {
        let mut err = ValidationError::new("tag_length");
        err.message = Some("Each tag must be at most 30 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Input for creating an item.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NewItem {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "not_blank", message = "Title must not be blank")
    )]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 50, message = "Category must be at most 50 characters"))]
    pub category: Option<String>,
    pub priority: Option<ItemPriority>,
    pub status: Option<ItemStatus>,
    #[validate(
        length(max = 20, message = "At most 20 tags are allowed"),
        custom = "validate_tags"
    )]
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i32>,
    pub is_public: Option<bool>,
}

/// Partial update for an item. Omitted fields keep their current value.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct ItemUpdate {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "not_blank", message = "Title must not be blank")
    )]
    pub title: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[validate(
        length(min = 1, max = 50, message = "Category must be between 1 and 50 characters"),
        custom(function = "not_blank", message = "Category must not be blank")
    )]
    pub category: Option<String>,
    pub priority: Option<ItemPriority>,
    pub status: Option<ItemStatus>,
    #[validate(
        length(max = 20, message = "At most 20 tags are allowed"),
        custom = "validate_tags"
    )]
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i32>,
    pub is_public: Option<bool>,
}

/// Columns accepted by `sort_by` on the list endpoint.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
    Title,
}

impl ItemSortField {
    pub fn column(&self) -> &'static str {
        match self {
            ItemSortField::CreatedAt => "created_at",
            ItemSortField::UpdatedAt => "updated_at",
            ItemSortField::DueDate => "due_date",
            ItemSortField::Priority => "priority",
            ItemSortField::Title => "title",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query parameters for filtering, paging and sorting the item list.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ItemQuery {
    pub status: Option<ItemStatus>,
    pub priority: Option<ItemPriority>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(length(max = 30))]
    pub tag: Option<String>,
    #[validate(length(max = 200, message = "Search term must be at most 200 characters"))]
    pub search: Option<String>,
    pub overdue: Option<bool>,
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort_by: ItemSortField,
    #[serde(default)]
    pub order: SortOrder,
}

/// A comment on an item, joined with its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub item_id: Uuid,
    pub user_id: i32,
    pub username: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewComment {
    #[validate(
        length(min = 1, max = 500, message = "Comment must be between 1 and 500 characters"),
        custom(function = "not_blank", message = "Comment must not be blank")
    )]
    pub text: String,
}

/// An item together with its social data, returned by `GET /api/items/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    pub comments: Vec<Comment>,
    pub likes: i64,
    pub liked_by_me: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes: i64,
}
