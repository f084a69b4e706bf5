//! Catalog queries: categories, products, images and available stock.
//!
//! The storefront only ever shows active products, so every product query
//! here filters on `is_active`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bozor_core::models::{Category, Product, ProductImage};
use bozor_core::pagination::PageRequest;
use bozor_core::{CategoryId, ProductId};

use super::RepositoryError;

macro_rules! product_columns {
    () => {
        "id, category_id, name, slug, short_description, description, price, compare_at_price, \
         stock, is_active, featured, created_at, updated_at"
    };
}

macro_rules! category_columns {
    () => {
        "id, name, slug, parent_id, description, is_active, created_at, updated_at"
    };
}

macro_rules! image_columns {
    () => {
        "id, product_id, image, alt, is_default, sort_order, created_at"
    };
}

/// Filters for the catalog listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Restrict to these categories (a category plus its descendants).
    pub category_ids: Option<Vec<CategoryId>>,
    /// Case-insensitive substring of the product name.
    pub query: Option<String>,
}

impl ProductFilter {
    fn category_ids(&self) -> Option<Vec<i32>> {
        self.category_ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| id.as_i32()).collect())
    }

    fn name_pattern(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(super::contains_pattern)
    }
}

/// Read-only catalog access for the storefront.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every category, active or not. The table is small; callers walk the
    /// tree in memory with `bozor_core::catalog`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn all_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM categories ORDER BY name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// Active category by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM categories WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(category)
    }

    /// Featured active products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn featured_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE is_active AND featured ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Latest active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE is_active ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Count active products matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_products(&self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products \
             WHERE is_active \
               AND ($1::int[] IS NULL OR category_id = ANY($1)) \
               AND ($2::text IS NULL OR name ILIKE $2)",
        )
        .bind(filter.category_ids())
        .bind(filter.name_pattern())
        .fetch_one(self.pool)
        .await?;

        Ok(total)
    }

    /// One page of active products matching `filter`, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search_products(
        &self,
        filter: &ProductFilter,
        page: &PageRequest,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products \
             WHERE is_active \
               AND ($1::int[] IS NULL OR category_id = ANY($1)) \
               AND ($2::text IS NULL OR name ILIKE $2) \
             ORDER BY name, id LIMIT $3 OFFSET $4"
        ))
        .bind(filter.category_ids())
        .bind(filter.name_pattern())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Active product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE id = $1 AND is_active"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Up to `limit` other active products from the same category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn related_products(
        &self,
        product: &Product,
        limit: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE is_active AND category_id = $1 AND id <> $2 \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        ))
        .bind(product.category_id)
        .bind(product.id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Images of a product, default first, then by sort order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images_for(&self, id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        let images = sqlx::query_as::<_, ProductImage>(concat!(
            "SELECT ",
            image_columns!(),
            " FROM product_images WHERE product_id = $1 \
             ORDER BY is_default DESC, sort_order, id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(images)
    }

    /// Cover image URL for each product that has at least one image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cover_images(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let raw: Vec<i32> = ids.iter().map(|id| id.as_i32()).collect();
        let images = sqlx::query_as::<_, ProductImage>(concat!(
            "SELECT DISTINCT ON (product_id) ",
            image_columns!(),
            " FROM product_images WHERE product_id = ANY($1) \
             ORDER BY product_id, is_default DESC, sort_order, id"
        ))
        .bind(raw)
        .fetch_all(self.pool)
        .await?;

        Ok(images
            .into_iter()
            .map(|image| (image.product_id, image.url()))
            .collect())
    }

    /// Quantity held by commitments that have not expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn committed_quantity(
        &self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let committed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::bigint FROM inventory_commitments \
             WHERE product_id = $1 AND expires_at > $2",
        )
        .bind(id)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        Ok(committed)
    }
}

/// Stock left after unexpired commitments, never below zero.
#[must_use]
pub fn available_stock(product: &Product, committed: i64) -> i64 {
    (i64::from(product.stock) - committed).max(0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;

    fn product(stock: i32) -> Product {
        Product {
            id: ProductId::new(1),
            category_id: CategoryId::new(1),
            name: "Yashil choy".to_owned(),
            slug: "yashil-choy".to_owned(),
            short_description: String::new(),
            description: String::new(),
            price: Decimal::new(25_000, 0),
            compare_at_price: None,
            stock,
            is_active: true,
            featured: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_stock_subtracts_commitments() {
        assert_eq!(available_stock(&product(10), 3), 7);
        assert_eq!(available_stock(&product(2), 5), 0);
    }

    #[test]
    fn test_filter_ignores_blank_query() {
        let filter = ProductFilter {
            category_ids: None,
            query: Some("   ".to_owned()),
        };
        assert!(filter.name_pattern().is_none());
        assert!(filter.category_ids().is_none());
    }

    #[test]
    fn test_filter_category_ids() {
        let filter = ProductFilter {
            category_ids: Some(vec![CategoryId::new(3), CategoryId::new(1)]),
            query: Some("choy".to_owned()),
        };
        assert_eq!(filter.category_ids(), Some(vec![3, 1]));
        assert_eq!(filter.name_pattern().as_deref(), Some("%choy%"));
    }
}
