//! Catalog listing route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::catalog;
use bozor_core::models::{Category, Product};
use bozor_core::pagination::{Page, PageRequest};

use crate::db::CatalogRepository;
use crate::db::catalog::ProductFilter;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::Shopper;
use crate::routes::{Layout, MessageQuery, Pagination};
use crate::state::AppState;

/// Products per catalog page.
pub const PRODUCTS_PER_PAGE: u32 = 12;

/// A product plus its cover image, as shown in grids.
#[derive(Debug, Clone)]
pub struct ProductCard {
    pub product: Product,
    pub image_url: Option<String>,
}

/// Attach cover images to a list of products.
pub(crate) async fn product_cards(
    repo: &CatalogRepository<'_>,
    products: Vec<Product>,
) -> Result<Vec<ProductCard>> {
    let ids: Vec<_> = products.iter().map(|p| p.id).collect();
    let mut covers = repo.cover_images(&ids).await?;

    Ok(products
        .into_iter()
        .map(|product| ProductCard {
            image_url: covers.remove(&product.id),
            product,
        })
        .collect())
}

/// Catalog query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// Catalog page template.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/index.html")]
pub struct CatalogTemplate {
    pub layout: Layout,
    pub categories: Vec<Category>,
    pub current_category: Option<Category>,
    pub query: String,
    pub page: Page<ProductCard>,
    pub pagination: Pagination,
}

/// Pagination link for a catalog page, keeping the search term.
fn page_link(category: Option<&Category>, query: &str, number: u32) -> String {
    let base = category.map_or_else(|| "/catalog".to_string(), |c| format!("/catalog/{}", c.slug));
    if query.is_empty() {
        format!("{base}?page={number}")
    } else {
        format!("{base}?q={}&page={number}", urlencoding::encode(query))
    }
}

/// Display all active products.
#[instrument(skip(state, shopper, query))]
pub async fn index(
    State(state): State<AppState>,
    shopper: Shopper,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse> {
    render(&state, &shopper, None, query).await
}

/// Display the products of a category and all of its descendants.
#[instrument(skip(state, shopper, query))]
pub async fn category(
    State(state): State<AppState>,
    shopper: Shopper,
    Path(category_slug): Path<String>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse> {
    render(&state, &shopper, Some(&category_slug), query).await
}

async fn render(
    state: &AppState,
    shopper: &Shopper,
    category_slug: Option<&str>,
    query: CatalogQuery,
) -> Result<CatalogTemplate> {
    let repo = CatalogRepository::new(state.pool());
    let categories = repo.all_categories().await?;

    let current_category = match category_slug {
        Some(slug) => Some(
            repo.category_by_slug(slug)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("category {slug}")))?,
        ),
        None => None,
    };

    let search = query.q.as_deref().map(str::trim).unwrap_or_default().to_string();
    let filter = ProductFilter {
        category_ids: current_category
            .as_ref()
            .map(|c| catalog::descendants(&categories, c.id, true)),
        query: Some(search.clone()).filter(|q| !q.is_empty()),
    };

    let request = PageRequest::parse(query.page.as_deref(), PRODUCTS_PER_PAGE);
    let total = repo.count_products(&filter).await?;
    request.check(total)?;

    let products = repo.search_products(&filter, &request).await?;
    let cards = product_cards(&repo, products).await?;

    let active_categories = categories.into_iter().filter(|c| c.is_active).collect();
    let page = request.page(cards, total);
    let pagination = Pagination::new(&page, |n| page_link(current_category.as_ref(), &search, n));

    Ok(CatalogTemplate {
        layout: Layout::new(state, shopper, &query.messages).await,
        categories: active_categories,
        current_category,
        query: search,
        page,
        pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_link_keeps_query() {
        assert_eq!(page_link(None, "", 2), "/catalog?page=2");
        assert_eq!(page_link(None, "qora choy", 3), "/catalog?q=qora%20choy&page=3");
    }
}
