//! Product management queries, including the product's main image.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use bozor_core::models::{LOW_STOCK_THRESHOLD, Product, ProductImage};
use bozor_core::pagination::PageRequest;
use bozor_core::slug;
use bozor_core::{CategoryId, ProductId};

use super::{RepositoryError, search_pattern};

macro_rules! product_columns {
    () => {
        "p.id, p.category_id, p.name, p.slug, p.short_description, p.description, p.price, \
         p.compare_at_price, p.stock, p.is_active, p.featured, p.created_at, p.updated_at"
    };
}

/// `WHERE` clause for the product list: `$1` name pattern, `$2` active flag,
/// `$3` category.
macro_rules! product_filter {
    () => {
        " WHERE ($1::text IS NULL OR p.name ILIKE $1) \
            AND ($2::boolean IS NULL OR p.is_active = $2) \
            AND ($3::int IS NULL OR p.category_id = $3)"
    };
}

/// Room left for a `-N` suffix in the 220-character slug column.
const MAX_SLUG_BASE: usize = 210;

/// Filters for the product list.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name.
    pub query: Option<String>,
    /// `Some(true)` for active only, `Some(false)` for inactive only.
    pub is_active: Option<bool>,
    pub category_id: Option<CategoryId>,
}

/// A product with its category name and main image, for the list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    #[sqlx(flatten)]
    pub product: Product,
    pub category_name: String,
    pub image: Option<String>,
}

impl ProductRow {
    /// URL of the main image under `/media`.
    #[must_use]
    pub fn image_url(&self) -> Option<String> {
        self.image.as_ref().map(|path| format!("/media/{path}"))
    }
}

/// Counts shown above the product list.
#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct ProductStats {
    pub total: i64,
    pub active: i64,
}

/// Editable product fields. The slug is set once, on creation.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub category_id: CategoryId,
    pub short_description: String,
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub featured: bool,
}

pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar(concat!("SELECT COUNT(*) FROM products p", product_filter!()))
                .bind(search_pattern(filter.query.as_deref()))
                .bind(filter.is_active)
                .bind(filter.category_id)
                .fetch_one(self.pool)
                .await?;

        Ok(total)
    }

    /// One page of products matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: &PageRequest,
    ) -> Result<Vec<ProductRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            ", c.name AS category_name, \
               (SELECT i.image FROM product_images i WHERE i.product_id = p.id \
                ORDER BY i.is_default DESC, i.sort_order, i.id LIMIT 1) AS image \
             FROM products p JOIN categories c ON c.id = p.category_id",
            product_filter!(),
            " ORDER BY p.created_at DESC, p.id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(search_pattern(filter.query.as_deref()))
        .bind(filter.is_active)
        .bind(filter.category_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Total and active product counts, ignoring filters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<ProductStats, RepositoryError> {
        let stats = sqlx::query_as::<_, ProductStats>(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE is_active) AS active FROM products",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }

    /// Active products at or below the low-stock threshold, lowest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products p WHERE p.is_active AND p.stock <= $1 \
             ORDER BY p.stock, p.name LIMIT $2"
        ))
        .bind(LOW_STOCK_THRESHOLD)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slug_taken(&self, slug: &str) -> Result<bool, RepositoryError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1)")
                .bind(slug)
                .fetch_one(self.pool)
                .await?;
        Ok(taken)
    }

    /// First free slug derived from `name`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a lookup fails.
    pub async fn unique_slug(&self, name: &str) -> Result<String, RepositoryError> {
        let base = super::slug_base(name, "product", MAX_SLUG_BASE);
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
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput, slug: &str) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (category_id, name, slug, short_description, description, price, \
                                   compare_at_price, stock, is_active, featured) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id, category_id, name, slug, short_description, description, price, \
                       compare_at_price, stock, is_active, featured, created_at, updated_at",
        )
        .bind(input.category_id)
        .bind(&input.name)
        .bind(slug)
        .bind(&input.short_description)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.stock)
        .bind(input.is_active)
        .bind(input.featured)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product.
    pub async fn update(&self, id: ProductId, input: &ProductInput) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(
            "UPDATE products SET category_id = $2, name = $3, short_description = $4, \
                    description = $5, price = $6, compare_at_price = $7, stock = $8, \
                    is_active = $9, featured = $10, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, category_id, name, slug, short_description, description, price, \
                       compare_at_price, stock, is_active, featured, created_at, updated_at",
        )
        .bind(id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.short_description)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.stock)
        .bind(input.is_active)
        .bind(input.featured)
        .fetch_optional(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a product together with its image rows.
    ///
    /// Returns the stored image paths so the files can be removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` while order or cart items
    /// reference the product and `RepositoryError::NotFound` if there is no
    /// such product.
    pub async fn delete(&self, id: ProductId) -> Result<Vec<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let images: Vec<String> =
            sqlx::query_scalar("SELECT image FROM product_images WHERE product_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from_constraint)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(images)
    }

    /// The image shown for a product: the default one, else the first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn main_image(&self, id: ProductId) -> Result<Option<ProductImage>, RepositoryError> {
        let image = sqlx::query_as::<_, ProductImage>(
            "SELECT id, product_id, image, alt, is_default, sort_order, created_at \
             FROM product_images WHERE product_id = $1 \
             ORDER BY is_default DESC, sort_order, id LIMIT 1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(image)
    }

    /// Point the product's default image at `path`, creating the row if
    /// needed. The alt text follows the product name.
    ///
    /// Returns the previous default image path, if it changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_main_image(
        &self,
        id: ProductId,
        path: &str,
        alt: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> = sqlx::query_scalar(
            "SELECT image FROM product_images WHERE product_id = $1 AND is_default FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if previous.is_some() {
            sqlx::query(
                "UPDATE product_images SET image = $2, alt = $3 WHERE product_id = $1 AND is_default",
            )
            .bind(id)
            .bind(path)
            .bind(alt)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO product_images (product_id, image, alt, is_default) VALUES ($1, $2, $3, TRUE)",
            )
            .bind(id)
            .bind(path)
            .bind(alt)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(previous.filter(|old| old != path))
    }

    /// Delete the default image row. Returns its path, if there was one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_main_image(&self, id: ProductId) -> Result<Option<String>, RepositoryError> {
        let removed: Option<String> = sqlx::query_scalar(
            "DELETE FROM product_images WHERE product_id = $1 AND is_default RETURNING image",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(removed)
    }
}
