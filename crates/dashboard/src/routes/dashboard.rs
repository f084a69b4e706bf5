//! Overview page handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use tracing::instrument;

use bozor_core::models::Product;

use crate::db::orders::OrderRow;
use crate::db::stats::DashboardStats;
use crate::db::{OrderRepository, ProductRepository, StatsRepository};
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireStaff;
use crate::routes::{Layout, MessageQuery, Section};
use crate::state::AppState;

/// Orders shown under "Latest orders".
const LATEST_ORDERS: i64 = 6;
/// Products shown under "Low stock".
const LOW_STOCK_PRODUCTS: i64 = 5;

/// Overview template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub layout: Layout,
    pub stats: DashboardStats,
    pub latest_orders: Vec<OrderRow>,
    pub low_stock: Vec<Product>,
}

/// Overview page handler.
#[instrument(skip(staff, state))]
pub async fn home(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<DashboardTemplate> {
    let pool = state.pool();
    let stats = StatsRepository::new(pool).overview().await?;
    let latest_orders = OrderRepository::new(pool).latest(LATEST_ORDERS).await?;
    let low_stock = ProductRepository::new(pool)
        .low_stock(LOW_STOCK_PRODUCTS)
        .await?;

    Ok(DashboardTemplate {
        layout: Layout::new(staff, Section::Overview, &query),
        stats,
        latest_orders,
        low_stock,
    })
}
