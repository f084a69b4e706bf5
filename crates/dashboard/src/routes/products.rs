//! Product management pages.
//!
//! The create and edit forms are `multipart/form-data` so they can carry a
//! main image. Uploading one replaces the product's default image; ticking
//! `clear_main_image` removes it.

use std::str::FromStr;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::{Category, Product, ProductImage};
use bozor_core::pagination::{Page, PageRequest};
use bozor_core::{CategoryId, ProductId};

use crate::db::products::{ProductFilter, ProductInput, ProductRow, ProductStats};
use crate::db::{CategoryRepository, ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireStaff;
use crate::routes::{
    FormErrors, Layout, MessageQuery, Pagination, Section, checkbox, list_link, non_empty,
    with_message,
};
use crate::services::media::image_extension;
use crate::state::AppState;

const PER_PAGE: u32 = 12;
const MAX_NAME_LENGTH: usize = 200;
const MAX_SHORT_DESCRIPTION_LENGTH: usize = 255;
/// Longest alt text the image table stores.
const MAX_ALT_LENGTH: usize = 140;
/// Largest value a `NUMERIC(10, 2)` column holds.
const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

// =============================================================================
// Form Types
// =============================================================================

/// Product list query.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// An uploaded file from the form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Values shown in the product form, kept as typed so a failed submit can
/// be re-rendered unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductFields {
    pub name: String,
    pub category: String,
    pub short_description: String,
    pub description: String,
    pub price: String,
    pub compare_at_price: String,
    pub stock: String,
    pub is_active: bool,
    pub featured: bool,
    pub clear_main_image: bool,
}

impl ProductFields {
    fn new_product() -> Self {
        Self {
            stock: "0".to_string(),
            is_active: true,
            ..Self::default()
        }
    }

    /// Whether `id` is the selected category.
    #[must_use]
    pub fn is_category(&self, id: &CategoryId) -> bool {
        self.category == id.to_string()
    }
}

impl From<&Product> for ProductFields {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            category: product.category_id.to_string(),
            short_description: product.short_description.clone(),
            description: product.description.clone(),
            price: product.price.to_string(),
            compare_at_price: product
                .compare_at_price
                .map(|p| p.to_string())
                .unwrap_or_default(),
            stock: product.stock.to_string(),
            is_active: product.is_active,
            featured: product.featured,
            clear_main_image: false,
        }
    }
}

/// Read the multipart product form.
async fn read_form(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<(ProductFields, Option<Upload>, FormErrors)> {
    let mut fields = ProductFields::default();
    let mut upload = None;
    let mut errors = FormErrors::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "main_image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            // Browsers send an empty part when no file was chosen
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            if bytes.len() > max_upload_bytes {
                errors.add(
                    "main_image",
                    format!(
                        "The image is too large. The limit is {} MB.",
                        max_upload_bytes / (1024 * 1024)
                    ),
                );
            } else if bytes.is_empty() {
                errors.add("main_image", "The submitted file is empty.");
            } else if image_extension(&file_name).is_err() {
                errors.add(
                    "main_image",
                    "Upload a valid image. Allowed types: jpg, jpeg, png, gif, webp.",
                );
            } else {
                upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        match name.as_str() {
            "name" => fields.name = value,
            "category" => fields.category = value.trim().to_string(),
            "short_description" => fields.short_description = value,
            "description" => fields.description = value,
            "price" => fields.price = value.trim().to_string(),
            "compare_at_price" => fields.compare_at_price = value.trim().to_string(),
            "stock" => fields.stock = value.trim().to_string(),
            "is_active" => fields.is_active = checkbox(Some(&value)),
            "featured" => fields.featured = checkbox(Some(&value)),
            "clear_main_image" => fields.clear_main_image = checkbox(Some(&value)),
            _ => {}
        }
    }

    Ok((fields, upload, errors))
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Template, WebTemplate)]
#[template(path = "products/list.html")]
pub struct ProductListTemplate {
    pub layout: Layout,
    pub page: Page<ProductRow>,
    pub pagination: Pagination,
    pub stats: ProductStats,
    pub categories: Vec<Category>,
    pub q: String,
    pub status: String,
    pub category: String,
}

impl ProductListTemplate {
    /// Whether `id` is the category being filtered on.
    #[must_use]
    pub fn is_category(&self, id: &CategoryId) -> bool {
        self.category == id.to_string()
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "products/form.html")]
pub struct ProductFormTemplate {
    pub layout: Layout,
    /// The product being edited; `None` when creating.
    pub product: Option<Product>,
    pub main_image: Option<ProductImage>,
    pub categories: Vec<Category>,
    pub fields: ProductFields,
    pub errors: FormErrors,
}

#[derive(Template, WebTemplate)]
#[template(path = "products/confirm_delete.html")]
pub struct ProductDeleteTemplate {
    pub layout: Layout,
    pub product: Product,
}

// =============================================================================
// Validation
// =============================================================================

/// Parse a price: at most two decimal places, between 0 and [`MAX_PRICE`].
fn parse_price(raw: &str) -> std::result::Result<Decimal, &'static str> {
    let price = Decimal::from_str(raw).map_err(|_| "Enter a number.")?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err("Ensure this value is greater than or equal to 0.");
    }
    if price.normalize().scale() > 2 {
        return Err("Ensure that there are no more than 2 decimal places.");
    }
    if price > MAX_PRICE {
        return Err("Ensure that there are no more than 10 digits in total.");
    }
    Ok(price.round_dp(2))
}

fn parse_product_form(
    fields: &ProductFields,
    categories: &[Category],
    errors: &mut FormErrors,
) -> Option<ProductInput> {
    let name = fields.name.trim();
    if name.is_empty() {
        errors.add("name", "This field is required.");
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            "name",
            format!("Ensure this value has at most {MAX_NAME_LENGTH} characters."),
        );
    }

    let category_id = match non_empty(Some(fields.category.as_str())) {
        None => {
            errors.add("category", "This field is required.");
            None
        }
        Some(raw) => {
            let id = raw
                .parse::<CategoryId>()
                .ok()
                .filter(|id| categories.iter().any(|c| c.id == *id));
            if id.is_none() {
                errors.add(
                    "category",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
            id
        }
    };

    let short_description = fields.short_description.trim();
    if short_description.chars().count() > MAX_SHORT_DESCRIPTION_LENGTH {
        errors.add(
            "short_description",
            format!("Ensure this value has at most {MAX_SHORT_DESCRIPTION_LENGTH} characters."),
        );
    }

    let price = if fields.price.is_empty() {
        errors.add("price", "This field is required.");
        None
    } else {
        parse_price(&fields.price)
            .map_err(|message| errors.add("price", message))
            .ok()
    };

    let compare_at_price = if fields.compare_at_price.is_empty() {
        Some(None)
    } else {
        parse_price(&fields.compare_at_price)
            .map(Some)
            .map_err(|message| errors.add("compare_at_price", message))
            .ok()
    };

    let stock = match fields.stock.parse::<i32>() {
        Ok(stock) if stock >= 0 => Some(stock),
        Ok(_) => {
            errors.add("stock", "Ensure this value is greater than or equal to 0.");
            None
        }
        Err(_) if fields.stock.is_empty() => {
            errors.add("stock", "This field is required.");
            None
        }
        Err(_) => {
            errors.add("stock", "Enter a whole number.");
            None
        }
    };

    if !errors.is_empty() {
        return None;
    }

    Some(ProductInput {
        name: name.to_owned(),
        category_id: category_id?,
        short_description: short_description.to_owned(),
        description: fields.description.trim().to_owned(),
        price: price?,
        compare_at_price: compare_at_price?,
        stock: stock?,
        is_active: fields.is_active,
        featured: fields.featured,
    })
}

fn alt_text(name: &str) -> String {
    name.chars().take(MAX_ALT_LENGTH).collect()
}

async fn find_product(products: &ProductRepository<'_>, id: ProductId) -> Result<Product> {
    products
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}

/// Delete a file no row points to any more. Failures are only logged.
async fn discard_file(state: &AppState, path: &str) {
    if let Err(e) = state.media().remove(path).await {
        tracing::warn!(error = %e, path, "Failed to remove media file");
    }
}

/// Apply the image part of the form after the product row is saved.
async fn apply_main_image(
    state: &AppState,
    product: &Product,
    upload: Option<Upload>,
    clear: bool,
) -> Result<()> {
    let products = ProductRepository::new(state.pool());

    if let Some(upload) = upload {
        let path = state
            .media()
            .save_product_image(&upload.file_name, &upload.bytes)
            .await?;
        let replaced = products
            .set_main_image(product.id, &path, &alt_text(&product.name))
            .await?;
        tracing::info!(product_id = %product.id, %path, "Main image replaced");
        if let Some(old) = replaced {
            discard_file(state, &old).await;
        }
    } else if clear && let Some(old) = products.clear_main_image(product.id).await? {
        tracing::info!(product_id = %product.id, "Main image cleared");
        discard_file(state, &old).await;
    }

    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Product list with search, status and category filters.
#[instrument(skip(staff, state))]
pub async fn index(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<ProductListTemplate> {
    let pool = state.pool();
    let products = ProductRepository::new(pool);

    let status = match query.status.as_deref().map(str::trim) {
        Some("active") => "active",
        Some("inactive") => "inactive",
        _ => "",
    };
    let category_id = non_empty(query.category.as_deref()).and_then(|raw| raw.parse().ok());
    let filter = ProductFilter {
        query: query.q.clone(),
        is_active: match status {
            "active" => Some(true),
            "inactive" => Some(false),
            _ => None,
        },
        category_id,
    };

    let request = PageRequest::parse(query.page.as_deref(), PER_PAGE);
    let total = products.count(&filter).await?;
    request.check(total)?;
    let page = request.page(products.list(&filter, &request).await?, total);

    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    let category = category_id.map(|id: CategoryId| id.to_string()).unwrap_or_default();
    let pagination = Pagination::new(&page, |n| {
        list_link(
            "/products",
            &[
                ("q", Some(q.as_str())),
                ("status", Some(status)),
                ("category", Some(category.as_str())),
            ],
            n,
        )
    });

    Ok(ProductListTemplate {
        layout: Layout::new(staff, Section::Products, &query.messages),
        stats: products.stats().await?,
        categories: CategoryRepository::new(pool).active().await?,
        page,
        pagination,
        q,
        status: status.to_string(),
        category,
    })
}

/// Empty create form.
#[instrument(skip(staff, state))]
pub async fn create_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<ProductFormTemplate> {
    Ok(ProductFormTemplate {
        layout: Layout::plain(staff, Section::Products),
        product: None,
        main_image: None,
        categories: CategoryRepository::new(state.pool()).active().await?,
        fields: ProductFields::new_product(),
        errors: FormErrors::default(),
    })
}

/// Create a product, then store its main image if one was uploaded.
#[instrument(skip(staff, state, multipart), fields(staff_id = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response> {
    let categories = CategoryRepository::new(state.pool()).active().await?;
    let (fields, upload, mut errors) =
        read_form(multipart, state.config().max_upload_bytes).await?;

    if let Some(input) = parse_product_form(&fields, &categories, &mut errors) {
        let products = ProductRepository::new(state.pool());
        let slug = products.unique_slug(&input.name).await?;
        match products.create(&input, &slug).await {
            Ok(product) => {
                tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");
                apply_main_image(&state, &product, upload, false).await?;
                let target =
                    with_message("/products", "success", "product_created", &product.name);
                return Ok(Redirect::to(&target).into_response());
            }
            Err(RepositoryError::Conflict(constraint)) => {
                tracing::warn!(%constraint, "Product insert conflicted");
                errors.add(
                    FormErrors::NON_FIELD,
                    "A product with a similar name was just created. Please submit again.",
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(ProductFormTemplate {
        layout: Layout::plain(staff, Section::Products),
        product: None,
        main_image: None,
        categories,
        fields,
        errors,
    }
    .into_response())
}

/// Edit form.
#[instrument(skip(staff, state))]
pub async fn update_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<ProductFormTemplate> {
    let products = ProductRepository::new(state.pool());
    let product = find_product(&products, id).await?;

    Ok(ProductFormTemplate {
        layout: Layout::plain(staff, Section::Products),
        main_image: products.main_image(id).await?,
        categories: CategoryRepository::new(state.pool()).active().await?,
        fields: ProductFields::from(&product),
        product: Some(product),
        errors: FormErrors::default(),
    })
}

/// Save an edited product and apply the image upload or clear.
#[instrument(skip(staff, state, multipart), fields(staff_id = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<Response> {
    let products = ProductRepository::new(state.pool());
    let product = find_product(&products, id).await?;
    let categories = CategoryRepository::new(state.pool()).active().await?;
    let (fields, upload, mut errors) =
        read_form(multipart, state.config().max_upload_bytes).await?;

    if let Some(input) = parse_product_form(&fields, &categories, &mut errors) {
        let updated = match products.update(id, &input).await {
            Ok(updated) => updated,
            Err(RepositoryError::NotFound) => {
                return Err(AppError::NotFound(format!("product {id}")));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(product_id = %id, "Product updated");
        apply_main_image(&state, &updated, upload, fields.clear_main_image).await?;

        let target = with_message("/products", "success", "product_updated", &updated.name);
        return Ok(Redirect::to(&target).into_response());
    }

    Ok(ProductFormTemplate {
        layout: Layout::plain(staff, Section::Products),
        main_image: products.main_image(id).await?,
        product: Some(product),
        categories,
        fields,
        errors,
    }
    .into_response())
}

/// Delete confirmation.
#[instrument(skip(staff, state))]
pub async fn delete_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<ProductDeleteTemplate> {
    let product = find_product(&ProductRepository::new(state.pool()), id).await?;

    Ok(ProductDeleteTemplate {
        layout: Layout::plain(staff, Section::Products),
        product,
    })
}

/// Delete a product unless orders or carts reference it.
#[instrument(skip(staff, state), fields(staff_id = %staff.id))]
pub async fn delete(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Redirect> {
    let products = ProductRepository::new(state.pool());
    let product = find_product(&products, id).await?;

    let (level, code) = match products.delete(id).await {
        Ok(images) => {
            tracing::info!(product_id = %id, "Product deleted");
            for path in &images {
                discard_file(&state, path).await;
            }
            ("success", "product_deleted")
        }
        Err(RepositoryError::Conflict(constraint)) => {
            tracing::info!(product_id = %id, %constraint, "Product delete refused");
            ("error", "product_in_use")
        }
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(format!("product {id}")));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Redirect::to(&with_message(
        "/products",
        level,
        code,
        &product.name,
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn categories() -> Vec<Category> {
        vec![Category {
            id: CategoryId::new(1),
            name: "Tea".to_string(),
            slug: "tea".to_string(),
            parent_id: None,
            description: String::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }]
    }

    fn valid_fields() -> ProductFields {
        ProductFields {
            name: "Ko'k choy".to_string(),
            category: "1".to_string(),
            price: "25000.50".to_string(),
            ..ProductFields::new_product()
        }
    }

    #[test]
    fn test_max_price_fills_numeric_10_2() {
        assert_eq!(MAX_PRICE, Decimal::new(9_999_999_999, 2));
        assert_eq!(MAX_PRICE.to_string(), "99999999.99");
    }

    #[test]
    fn test_is_category() {
        let fields = valid_fields();
        assert!(fields.is_category(&CategoryId::new(1)));
        assert!(!fields.is_category(&CategoryId::new(2)));
        assert!(!ProductFields::new_product().is_category(&CategoryId::new(1)));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("12.5"), Ok(Decimal::new(1250, 2)));
        assert_eq!(parse_price("0"), Ok(Decimal::ZERO));
        assert_eq!(parse_price("99999999.99"), Ok(MAX_PRICE));
        assert!(parse_price("-1").is_err());
        assert!(parse_price("1.999").is_err());
        assert!(parse_price("100000000").is_err());
        assert!(parse_price("abc").is_err());
    }

    #[test]
    fn test_parse_product_form_valid() {
        let mut errors = FormErrors::default();
        let input = parse_product_form(&valid_fields(), &categories(), &mut errors)
            .unwrap_or_else(|| panic!("form should be valid: {errors:?}"));
        assert_eq!(input.category_id, CategoryId::new(1));
        assert_eq!(input.price, Decimal::new(2_500_050, 2));
        assert_eq!(input.compare_at_price, None);
        assert_eq!(input.stock, 0);
        assert!(input.is_active);
        assert!(!input.featured);
    }

    #[test]
    fn test_parse_product_form_errors() {
        let fields = ProductFields {
            name: String::new(),
            category: "7".to_string(),
            price: "-3".to_string(),
            compare_at_price: "x".to_string(),
            stock: "-1".to_string(),
            ..ProductFields::default()
        };
        let mut errors = FormErrors::default();
        assert!(parse_product_form(&fields, &categories(), &mut errors).is_none());
        for field in ["name", "category", "price", "compare_at_price", "stock"] {
            assert_eq!(errors.get(field).len(), 1, "{field}");
        }
    }

    #[test]
    fn test_upload_error_blocks_valid_fields() {
        let mut errors = FormErrors::default();
        errors.add("main_image", "Upload a valid image.");
        assert!(parse_product_form(&valid_fields(), &categories(), &mut errors).is_none());
    }

    #[test]
    fn test_alt_text_is_truncated() {
        assert_eq!(alt_text("Choy"), "Choy");
        assert_eq!(alt_text(&"я".repeat(200)).chars().count(), MAX_ALT_LENGTH);
    }
}
