//! Category management queries.

use serde::Serialize;
use sqlx::PgPool;

use bozor_core::CategoryId;
use bozor_core::models::Category;
use bozor_core::pagination::PageRequest;
use bozor_core::slug;

use super::RepositoryError;

macro_rules! category_columns {
    () => {
        "c.id, c.name, c.slug, c.parent_id, c.description, c.is_active, c.created_at, c.updated_at"
    };
}

/// Room left for a `-N` suffix in the 140-character slug column.
const MAX_SLUG_BASE: usize = 130;

/// Unique constraint on `categories.name`.
pub const NAME_CONSTRAINT: &str = "categories_name_key";

/// A category with its parent's name and how many products it holds.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryRow {
    #[sqlx(flatten)]
    pub category: Category,
    pub parent_name: Option<String>,
    pub product_count: i64,
}

/// Editable category fields. The slug is set once, on creation.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub description: String,
    pub is_active: bool,
}

pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM categories c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(category)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(self.pool)
            .await?;
        Ok(total)
    }

    /// One page of categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, page: &PageRequest) -> Result<Vec<CategoryRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(concat!(
            "SELECT ",
            category_columns!(),
            ", parent.name AS parent_name, \
               (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count \
             FROM categories c \
             LEFT JOIN categories parent ON parent.id = c.parent_id \
             ORDER BY c.name, c.id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Active categories by name, for the parent picker and product forms.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM categories c WHERE c.is_active ORDER BY c.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// Whether a category already uses `slug`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slug_taken(&self, slug: &str) -> Result<bool, RepositoryError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE slug = $1)")
                .bind(slug)
                .fetch_one(self.pool)
                .await?;
        Ok(taken)
    }

    /// First free slug derived from `name`: `base`, `base-2`, `base-3`, ...
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a lookup fails.
    pub async fn unique_slug(&self, name: &str) -> Result<String, RepositoryError> {
        let base = super::slug_base(name, "category", MAX_SLUG_BASE);
        let mut attempt = 1;
        loop {
            let candidate = slug::with_suffix(&base, attempt);
            if !self.slug_taken(&candidate).await? {
                return Ok(candidate);
            }
            attempt += 1;
        }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` naming the violated constraint
    /// when the name or slug is taken.
    pub async fn create(
        &self,
        input: &CategoryInput,
        slug: &str,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug, parent_id, description, is_active) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, slug, parent_id, description, is_active, created_at, updated_at",
        )
        .bind(&input.name)
        .bind(slug)
        .bind(input.parent_id)
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown category and
    /// `RepositoryError::Conflict` when the name is taken.
    pub async fn update(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2, parent_id = $3, description = $4, is_active = $5, \
                    updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, slug, parent_id, description, is_active, created_at, updated_at",
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.parent_id)
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a category. Child categories lose their parent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` while products reference it and
    /// `RepositoryError::NotFound` if there is no such category.
    pub async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(RepositoryError::from_constraint)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
