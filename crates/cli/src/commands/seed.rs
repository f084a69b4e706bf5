//! Seed the catalog from a YAML file.
//!
//! Categories and products are upserted by slug, so running the same file
//! twice updates rows instead of duplicating them.
//!
//! ```yaml
//! categories:
//!   - name: Tea
//!     description: Loose leaf and bags
//!     products:
//!       - name: Green tea
//!         price: "25000.00"
//!         stock: 40
//!         featured: true
//!   - name: Green
//!     parent: tea
//!     is_active: false
//! ```
//!
//! `parent` is the slug of a category defined earlier in the file or
//! already in the database. Prices are strings so they stay exact.

use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{error, info};

use bozor_core::slug::slugify;

use super::{ConnectError, connect};

const MAX_CATEGORY_NAME: usize = 120;
const MAX_CATEGORY_SLUG: usize = 140;
const MAX_PRODUCT_NAME: usize = 200;
const MAX_PRODUCT_SLUG: usize = 220;
const MAX_SHORT_DESCRIPTION: usize = 255;
const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error("Unknown parent category {parent:?} for {category:?}")]
    UnknownParent { category: String, parent: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Top level of the seed file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySeed {
    pub name: String,
    pub slug: Option<String>,
    /// Slug of the parent category.
    pub parent: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSeed {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    pub price: String,
    pub compare_at_price: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub featured: bool,
}

const fn default_true() -> bool {
    true
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub cleared_products: u64,
    pub cleared_categories: u64,
    pub categories: usize,
    pub products: usize,
}

impl CategorySeed {
    fn slug(&self) -> String {
        seed_slug(self.slug.as_deref(), &self.name, "category", MAX_CATEGORY_SLUG)
    }
}

impl ProductSeed {
    fn slug(&self) -> String {
        seed_slug(self.slug.as_deref(), &self.name, "product", MAX_PRODUCT_SLUG)
    }
}

fn seed_slug(explicit: Option<&str>, name: &str, fallback: &str, max_len: usize) -> String {
    let slug = slugify(explicit.unwrap_or(name));
    let slug = if slug.is_empty() {
        fallback.to_owned()
    } else {
        slug
    };
    slug.chars()
        .take(max_len)
        .collect::<String>()
        .trim_end_matches('-')
        .to_owned()
}

fn parse_price(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|p| !p.is_sign_negative() && p.normalize().scale() <= 2 && *p <= MAX_PRICE)
}

/// Every problem in the file, so they can be fixed in one pass.
#[must_use]
pub fn validate(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut category_slugs = Vec::new();
    let mut product_slugs = Vec::new();

    for category in &catalog.categories {
        let name = category.name.trim();
        if name.is_empty() {
            errors.push("category with an empty name".to_owned());
        } else if name.chars().count() > MAX_CATEGORY_NAME {
            errors.push(format!("category {name:?}: name over {MAX_CATEGORY_NAME} characters"));
        }

        let slug = category.slug();
        if category_slugs.contains(&slug) {
            errors.push(format!("category {name:?}: slug {slug:?} used twice"));
        }
        if category.parent.as_deref() == Some(slug.as_str()) {
            errors.push(format!("category {name:?}: cannot be its own parent"));
        }
        category_slugs.push(slug);

        for product in &category.products {
            let product_name = product.name.trim();
            let label = format!("product {product_name:?} in {name:?}");
            if product_name.is_empty() {
                errors.push(format!("product with an empty name in {name:?}"));
            } else if product_name.chars().count() > MAX_PRODUCT_NAME {
                errors.push(format!("{label}: name over {MAX_PRODUCT_NAME} characters"));
            }
            if product.short_description.chars().count() > MAX_SHORT_DESCRIPTION {
                errors.push(format!(
                    "{label}: short_description over {MAX_SHORT_DESCRIPTION} characters"
                ));
            }
            if parse_price(&product.price).is_none() {
                errors.push(format!("{label}: invalid price {:?}", product.price));
            }
            if let Some(compare) = &product.compare_at_price
                && parse_price(compare).is_none()
            {
                errors.push(format!("{label}: invalid compare_at_price {compare:?}"));
            }
            if product.stock < 0 {
                errors.push(format!("{label}: negative stock"));
            }

            let product_slug = product.slug();
            if product_slugs.contains(&product_slug) {
                errors.push(format!("{label}: slug {product_slug:?} used twice"));
            }
            product_slugs.push(product_slug);
        }
    }

    errors
}

/// Delete products no order or cart references, then categories left empty.
async fn clear(tx: &mut Transaction<'_, Postgres>) -> Result<(u64, u64), sqlx::Error> {
    let products = sqlx::query(
        "DELETE FROM products p \
         WHERE NOT EXISTS (SELECT 1 FROM order_items oi WHERE oi.product_id = p.id) \
           AND NOT EXISTS (SELECT 1 FROM cart_items ci WHERE ci.product_id = p.id)",
    )
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let categories = sqlx::query(
        "DELETE FROM categories c \
         WHERE NOT EXISTS (SELECT 1 FROM products p WHERE p.category_id = c.id)",
    )
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok((products, categories))
}

async fn upsert_category(
    tx: &mut Transaction<'_, Postgres>,
    category: &CategorySeed,
) -> Result<i32, SeedError> {
    let parent_id: Option<i32> = match &category.parent {
        None => None,
        Some(parent) => Some(
            sqlx::query_scalar("SELECT id FROM categories WHERE slug = $1")
                .bind(parent)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| SeedError::UnknownParent {
                    category: category.name.clone(),
                    parent: parent.clone(),
                })?,
        ),
    };

    let id = sqlx::query_scalar(
        "INSERT INTO categories (name, slug, parent_id, description, is_active) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name, parent_id = EXCLUDED.parent_id, \
             description = EXCLUDED.description, is_active = EXCLUDED.is_active, updated_at = now() \
         RETURNING id",
    )
    .bind(category.name.trim())
    .bind(category.slug())
    .bind(parent_id)
    .bind(category.description.trim())
    .bind(category.is_active)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

async fn upsert_product(
    tx: &mut Transaction<'_, Postgres>,
    category_id: i32,
    product: &ProductSeed,
) -> Result<(), SeedError> {
    sqlx::query(
        "INSERT INTO products (category_id, name, slug, short_description, description, price, \
             compare_at_price, stock, is_active, featured) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (slug) DO UPDATE SET category_id = EXCLUDED.category_id, \
             name = EXCLUDED.name, short_description = EXCLUDED.short_description, \
             description = EXCLUDED.description, price = EXCLUDED.price, \
             compare_at_price = EXCLUDED.compare_at_price, stock = EXCLUDED.stock, \
             is_active = EXCLUDED.is_active, featured = EXCLUDED.featured, updated_at = now()",
    )
    .bind(category_id)
    .bind(product.name.trim())
    .bind(product.slug())
    .bind(product.short_description.trim())
    .bind(product.description.trim())
    .bind(parse_price(&product.price))
    .bind(product.compare_at_price.as_deref().and_then(parse_price))
    .bind(product.stock)
    .bind(product.is_active)
    .bind(product.featured)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Write a validated catalog in one transaction.
pub async fn apply(
    pool: &PgPool,
    catalog: &CatalogFile,
    clear_existing: bool,
) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();
    let mut tx = pool.begin().await?;

    if clear_existing {
        (summary.cleared_products, summary.cleared_categories) = clear(&mut tx).await?;
    }

    for category in &catalog.categories {
        let category_id = upsert_category(&mut tx, category).await?;
        summary.categories += 1;
        for product in &category.products {
            upsert_product(&mut tx, category_id, product).await?;
            summary.products += 1;
        }
    }

    tx.commit().await?;
    Ok(summary)
}

/// Parse and validate a seed file.
pub async fn load(file_path: &str) -> Result<CatalogFile, SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::NotFound(file_path.to_owned()));
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    let errors = validate(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(errors.len()));
    }

    Ok(catalog)
}

/// `seed catalog <file> [--clear]`.
pub async fn catalog(file_path: &str, clear_existing: bool) -> Result<(), SeedError> {
    // Read and validate before connecting to the database
    let catalog = load(file_path).await?;
    info!(categories = catalog.categories.len(), "Parsed catalog");

    let pool = connect().await?;
    info!(clear_existing, "Starting seeding process");
    let summary = apply(&pool, &catalog, clear_existing).await?;

    info!("Seeding complete!");
    if clear_existing {
        info!("  Products removed: {}", summary.cleared_products);
        info!("  Categories removed: {}", summary.cleared_categories);
    }
    info!("  Categories upserted: {}", summary.categories);
    info!("  Products upserted: {}", summary.products);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
categories:
  - name: Tea
    products:
      - name: Ko'k choy
        price: "25000.50"
        compare_at_price: "30000"
        stock: 12
        featured: true
  - name: Green tea
    slug: green
    parent: tea
    is_active: false
"#;

    fn parse(yaml: &str) -> CatalogFile {
        serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_sample_parses_with_defaults() {
        let catalog = parse(SAMPLE);
        assert_eq!(catalog.categories.len(), 2);

        let tea = &catalog.categories[0];
        assert!(tea.is_active);
        assert_eq!(tea.slug(), "tea");
        let product = &tea.products[0];
        assert_eq!(product.slug(), "kok-choy");
        assert!(product.is_active);
        assert_eq!(parse_price(&product.price), Some(Decimal::new(2_500_050, 2)));

        let green = &catalog.categories[1];
        assert_eq!(green.slug(), "green");
        assert_eq!(green.parent.as_deref(), Some("tea"));
        assert!(!green.is_active);

        assert!(validate(&catalog).is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<CatalogFile, _> =
            serde_yaml::from_str("categories:\n  - name: Tea\n    colour: green\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let catalog = parse(
            r#"
categories:
  - name: ""
  - name: Tea
    parent: tea
    products:
      - name: Cup
        price: "-1"
        stock: -2
      - name: Cup
        price: "1.005"
        compare_at_price: "abc"
"#,
        );
        let errors = validate(&catalog);
        assert_eq!(errors.len(), 7, "{errors:#?}");
        assert!(errors.iter().any(|e| e.contains("own parent")));
        assert!(errors.iter().any(|e| e.contains("\"cup\" used twice")));
    }

    #[test]
    fn test_seed_slug_fallback_and_truncation() {
        assert_eq!(seed_slug(None, "!!!", "product", 220), "product");
        assert_eq!(seed_slug(Some("Custom Slug"), "x", "product", 220), "custom-slug");
        assert_eq!(seed_slug(None, &"a".repeat(300), "product", 220).len(), 220);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 12.5 "), Some(Decimal::new(125, 1)));
        assert_eq!(parse_price("99999999.99"), Some(MAX_PRICE));
        assert_eq!(MAX_PRICE, Decimal::new(9_999_999_999, 2));
        assert_eq!(parse_price("100000000"), None);
        assert_eq!(parse_price("1.999"), None);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(matches!(
            load("/definitely/not/here.yaml").await,
            Err(SeedError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_catalog() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, "categories:\n  - name: Tea\n    products:\n      - name: Cup\n        price: nope\n")
            .unwrap_or_else(|e| panic!("{e}"));

        let result = load(path.to_str().unwrap_or_default()).await;
        assert!(matches!(result, Err(SeedError::Invalid(1))));
    }
}
