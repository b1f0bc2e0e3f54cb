//! Catalog service for library items and categories

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        category::{Category, CreateCategory},
        enums::ItemStatus,
        item::{CreateItem, ItemQuery, LibraryItem, UpdateItem},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search items with pagination
    pub async fn search_items(&self, query: &ItemQuery) -> AppResult<(Vec<LibraryItem>, i64)> {
        self.repository.items.search(query).await
    }

    pub async fn get_item(&self, id: i32) -> AppResult<LibraryItem> {
        self.repository.items.get_by_id(id).await
    }

    pub async fn create_item(&self, item: &CreateItem) -> AppResult<LibraryItem> {
        item.validate()?;
        let created = self.repository.items.create(item).await?;
        tracing::info!(item_id = created.id, unique_item_id = %created.unique_item_id, "Item created");
        Ok(created)
    }

    /// Update an item. Status changes into or out of BORROWED belong to circulation.
    pub async fn update_item(&self, id: i32, item: &UpdateItem) -> AppResult<LibraryItem> {
        item.validate()?;

        if let Some(status) = item.status {
            if status == ItemStatus::Borrowed {
                return Err(AppError::BadRequest(
                    "Items are marked BORROWED by checking them out".to_string(),
                ));
            }
            if self.repository.loans.item_has_open_loan(id).await? {
                return Err(AppError::Conflict(
                    "Item is on loan; return it before changing its status".to_string(),
                ));
            }
        }

        self.repository.items.update(id, item).await
    }

    /// Delete an item that is not currently on loan
    pub async fn delete_item(&self, id: i32) -> AppResult<()> {
        if self.repository.loans.item_has_open_loan(id).await? {
            return Err(AppError::Conflict("Item is currently on loan".to_string()));
        }
        self.repository.items.delete(id).await?;
        tracing::info!(item_id = id, "Item deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn create_category(&self, category: &CreateCategory) -> AppResult<Category> {
        category.validate()?;
        self.repository.categories.create(category.name.trim()).await
    }
}
