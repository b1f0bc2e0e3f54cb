//! Library items repository

use std::collections::HashMap;

use sqlx::{PgConnection, Pool, Postgres};

use super::page_bounds;
use crate::{
    error::{AppError, AppResult},
    models::{
        category::Category,
        enums::ItemStatus,
        item::{CreateItem, ItemQuery, LibraryItem, UpdateItem},
    },
};

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

fn map_write_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Conflict("An item with this unique item id already exists".to_string())
        }
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            AppError::BadRequest("Unknown category id".to_string())
        }
        other => other.into(),
    }
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get item by ID, with categories
    pub async fn get_by_id(&self, id: i32) -> AppResult<LibraryItem> {
        let mut item = sqlx::query_as::<_, LibraryItem>("SELECT * FROM library_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))?;

        item.categories = self
            .categories_for(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(item)
    }

    /// Search items with pagination
    pub async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<LibraryItem>, i64)> {
        let (limit, offset) = page_bounds(query.page, query.per_page);
        let pattern = query.search.as_ref().map(|s| format!("%{}%", s.trim()));

        const FILTER: &str = r#"
            WHERE ($1::text IS NULL OR i.title ILIKE $1 OR i.unique_item_id ILIKE $1)
              AND ($2::text IS NULL OR i.item_type = $2)
              AND ($3::text IS NULL OR i.status = $3)
              AND ($4::int IS NULL OR EXISTS (
                    SELECT 1 FROM item_categories ic
                    WHERE ic.item_id = i.id AND ic.category_id = $4))
        "#;

        let mut items = sqlx::query_as::<_, LibraryItem>(&format!(
            "SELECT i.* FROM library_items i {} ORDER BY i.title, i.id LIMIT $5 OFFSET $6",
            FILTER
        ))
        .bind(&pattern)
        .bind(query.item_type)
        .bind(query.status)
        .bind(query.category_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM library_items i {}",
            FILTER
        ))
        .bind(&pattern)
        .bind(query.item_type)
        .bind(query.status)
        .bind(query.category_id)
        .fetch_one(&self.pool)
        .await?;

        let ids: Vec<i32> = items.iter().map(|i| i.id).collect();
        let mut categories = self.categories_for(&ids).await?;
        for item in &mut items {
            item.categories = categories.remove(&item.id).unwrap_or_default();
        }

        Ok((items, total))
    }

    /// Categories of the given items, keyed by item id
    async fn categories_for(&self, item_ids: &[i32]) -> AppResult<HashMap<i32, Vec<Category>>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i32, i32, String)> = sqlx::query_as(
            r#"
            SELECT ic.item_id, c.id, c.name
            FROM item_categories ic
            JOIN categories c ON c.id = ic.category_id
            WHERE ic.item_id = ANY($1)
            ORDER BY c.name
            "#,
        )
        .bind(item_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<i32, Vec<Category>> = HashMap::new();
        for (item_id, id, name) in rows {
            map.entry(item_id).or_default().push(Category { id, name });
        }
        Ok(map)
    }

    /// Create an item and link its categories
    pub async fn create(&self, item: &CreateItem) -> AppResult<LibraryItem> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO library_items (unique_item_id, title, item_type, status, metadata)
            VALUES ($1, $2, $3, 'AVAILABLE', $4)
            RETURNING id
            "#,
        )
        .bind(&item.unique_item_id)
        .bind(&item.title)
        .bind(item.item_type)
        .bind(item.metadata.clone().unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        Self::replace_categories(&mut tx, id, &item.category_ids).await?;
        tx.commit().await?;

        self.get_by_id(id).await
    }

    /// Update an item; `None` fields are left unchanged
    pub async fn update(&self, id: i32, item: &UpdateItem) -> AppResult<LibraryItem> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE library_items
            SET unique_item_id = COALESCE($2, unique_item_id),
                title = COALESCE($3, title),
                item_type = COALESCE($4, item_type),
                status = COALESCE($5, status),
                metadata = COALESCE($6, metadata),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&item.unique_item_id)
        .bind(&item.title)
        .bind(item.item_type)
        .bind(item.status)
        .bind(&item.metadata)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_write_error)?;

        if updated.is_none() {
            return Err(AppError::NotFound(format!("Item with id {} not found", id)));
        }

        if let Some(ref category_ids) = item.category_ids {
            Self::replace_categories(&mut tx, id, category_ids).await?;
        }
        tx.commit().await?;

        self.get_by_id(id).await
    }

    async fn replace_categories(
        conn: &mut PgConnection,
        item_id: i32,
        category_ids: &[i32],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM item_categories WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;

        if !category_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO item_categories (item_id, category_id)
                SELECT $1, UNNEST($2::int[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(item_id)
            .bind(category_ids)
            .execute(&mut *conn)
            .await
            .map_err(map_write_error)?;
        }
        Ok(())
    }

    /// Delete an item
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM library_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    AppError::Conflict("Item has circulation history and cannot be deleted".to_string())
                }
                other => other.into(),
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Item with id {} not found", id)));
        }
        Ok(())
    }

    /// Lock an item row for the rest of the transaction
    pub async fn lock_for_update(&self, conn: &mut PgConnection, id: i32) -> AppResult<LibraryItem> {
        sqlx::query_as::<_, LibraryItem>("SELECT * FROM library_items WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))
    }

    pub async fn set_status(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ItemStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE library_items SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn count_by_status(&self) -> AppResult<Vec<(ItemStatus, i64)>> {
        let rows: Vec<(ItemStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM library_items GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
