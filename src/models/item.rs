//! Library item (catalog) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::category::Category;
use super::enums::{ItemStatus, ItemType};

/// Library item with its categories
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LibraryItem {
    pub id: i32,
    /// Shelf / barcode identifier, unique across the catalog
    pub unique_item_id: String,
    pub title: String,
    pub item_type: ItemType,
    pub status: ItemStatus,
    /// Author, ISBN, publisher and other descriptive fields
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub categories: Vec<Category>,
}

impl LibraryItem {
    pub fn is_available(&self) -> bool {
        self.status == ItemStatus::Available
    }
}

/// Item search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ItemQuery {
    /// Matches title or unique item id
    pub search: Option<String>,
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    pub category_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create item request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 64, message = "Item id must be 1-64 characters"))]
    pub unique_item_id: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub item_type: ItemType,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub category_ids: Vec<i32>,
}

/// Update item request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateItem {
    #[validate(length(min = 1, max = 64, message = "Item id must be 1-64 characters"))]
    pub unique_item_id: Option<String>,
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub item_type: Option<ItemType>,
    /// BORROWED is managed by circulation and cannot be set here
    pub status: Option<ItemStatus>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    pub category_ids: Option<Vec<i32>>,
}
