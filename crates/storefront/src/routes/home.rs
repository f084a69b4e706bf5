//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use bozor_core::catalog;
use bozor_core::models::Category;

use crate::db::CatalogRepository;
use crate::error::Result;
use crate::filters;
use crate::middleware::Shopper;
use crate::routes::catalog::{ProductCard, product_cards};
use crate::routes::{Layout, MessageQuery};
use crate::state::AppState;

const FEATURED_LIMIT: i64 = 8;
const LATEST_LIMIT: i64 = 12;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub categories: Vec<Category>,
    pub featured: Vec<ProductCard>,
    pub latest: Vec<ProductCard>,
}

/// Display the home page: top-level categories, featured and latest products.
#[instrument(skip(state, shopper, query))]
pub async fn home(
    State(state): State<AppState>,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let repo = CatalogRepository::new(state.pool());

    let all_categories = repo.all_categories().await?;
    let categories = catalog::roots(&all_categories).into_iter().cloned().collect();

    let featured = repo.featured_products(FEATURED_LIMIT).await?;
    let featured = product_cards(&repo, featured).await?;
    let latest = repo.latest_products(LATEST_LIMIT).await?;
    let latest = product_cards(&repo, latest).await?;

    Ok(HomeTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        categories,
        featured,
        latest,
    })
}
