//! Product detail and add-to-cart route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, header::REFERER},
    response::{IntoResponse, Redirect},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use bozor_core::ProductId;
use bozor_core::models::{Product, ProductImage};

use crate::db::CatalogRepository;
use crate::db::catalog::available_stock;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::Shopper;
use crate::routes::catalog::{ProductCard, product_cards};
use crate::routes::{Layout, MessageQuery, with_message};
use crate::state::AppState;

const RELATED_LIMIT: i64 = 4;

/// Product detail template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub layout: Layout,
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub available: i64,
    pub related: Vec<ProductCard>,
}

/// Add-to-cart form data. `quantity` stays a string so a bad value can be
/// reported instead of rejected by the extractor.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub quantity: Option<String>,
}

/// Parse a submitted quantity: a positive integer, missing means 1.
fn parse_quantity(raw: Option<&str>) -> Option<i32> {
    match raw.map(str::trim) {
        None | Some("") => Some(1),
        Some(value) => value.parse::<i32>().ok().filter(|q| *q >= 1),
    }
}

/// Local path of the page the form was posted from, if any.
fn referer_path(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(REFERER)?.to_str().ok()?;
    let url = url::Url::parse(referer).ok()?;
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        // Drop old message codes so they don't pile up.
        let kept: Vec<_> = query
            .split('&')
            .filter(|pair| {
                !["error=", "success=", "warning=", "detail="]
                    .iter()
                    .any(|prefix| pair.starts_with(prefix))
            })
            .collect();
        if !kept.is_empty() {
            path.push('?');
            path.push_str(&kept.join("&"));
        }
    }
    Some(path)
}

/// Display a product by slug.
#[instrument(skip(state, shopper, query))]
pub async fn show(
    State(state): State<AppState>,
    shopper: Shopper,
    Path(slug): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let repo = CatalogRepository::new(state.pool());
    let product = repo
        .product_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    let images = repo.images_for(product.id).await?;
    let committed = repo.committed_quantity(product.id, Utc::now()).await?;
    let related = repo.related_products(&product, RELATED_LIMIT).await?;
    let related = product_cards(&repo, related).await?;

    Ok(ProductShowTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        available: available_stock(&product, committed),
        product,
        images,
        related,
    })
}

async fn active_product(state: &AppState, id: ProductId) -> Result<Product> {
    CatalogRepository::new(state.pool())
        .product_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}

/// Add a product to the cart and go back to where the form was posted.
#[instrument(skip(state, shopper, headers, form))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    shopper: Shopper,
    Path(id): Path<ProductId>,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Redirect> {
    let product = active_product(&state, id).await?;
    let back = referer_path(&headers).unwrap_or_else(|| format!("/product/{}", product.slug));

    let Some(quantity) = parse_quantity(form.quantity.as_deref()) else {
        return Ok(Redirect::to(&with_message(&back, "error", "invalid_quantity")));
    };

    shopper.cart(state.pool()).await?.add_product(&product, quantity).await?;
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &product.id.to_string())]),
    );

    Ok(Redirect::to(&with_message(&back, "success", "added")))
}

/// Add one unit of a product and go to the cart.
#[instrument(skip(state, shopper))]
pub async fn quick_add(
    State(state): State<AppState>,
    shopper: Shopper,
    Path(id): Path<ProductId>,
) -> Result<Redirect> {
    let product = active_product(&state, id).await?;
    shopper.cart(state.pool()).await?.add_product(&product, 1).await?;

    Ok(Redirect::to("/cart?success=added"))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(None), Some(1));
        assert_eq!(parse_quantity(Some("")), Some(1));
        assert_eq!(parse_quantity(Some(" 3 ")), Some(3));
        assert_eq!(parse_quantity(Some("0")), None);
        assert_eq!(parse_quantity(Some("-2")), None);
        assert_eq!(parse_quantity(Some("two")), None);
    }

    #[test]
    fn test_referer_path_keeps_local_path_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_static("http://localhost:3000/catalog/choy?page=2&success=added"),
        );
        assert_eq!(referer_path(&headers).as_deref(), Some("/catalog/choy?page=2"));
    }

    #[test]
    fn test_referer_path_missing() {
        assert_eq!(referer_path(&HeaderMap::new()), None);
    }
}
