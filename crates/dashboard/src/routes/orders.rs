//! Order list and detail pages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::{Address, Payment};
use bozor_core::pagination::{Page, PageRequest};
use bozor_core::{OrderId, OrderStatus};

use crate::db::orders::{OrderLine, OrderRow, StatusCount, fill_status_counts};
use crate::db::{OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireStaff;
use crate::routes::{FormErrors, Layout, MessageQuery, Pagination, Section, list_link, with_message};
use crate::state::AppState;

const PER_PAGE: u32 = 20;

/// Order list query.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// Status and notes form on the detail page.
#[derive(Debug, Deserialize)]
pub struct OrderStatusForm {
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "orders/list.html")]
pub struct OrderListTemplate {
    pub layout: Layout,
    pub page: Page<OrderRow>,
    pub pagination: Pagination,
    pub status_counts: Vec<StatusCount>,
    /// Selected status filter, empty for all.
    pub status: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "orders/detail.html")]
pub struct OrderDetailTemplate {
    pub layout: Layout,
    pub order: OrderRow,
    pub lines: Vec<OrderLine>,
    pub address: Option<Address>,
    pub coupon_code: Option<String>,
    pub payment: Option<Payment>,
    pub statuses: [OrderStatus; 5],
    /// Status shown as selected in the form.
    pub status: String,
    pub notes: String,
    pub errors: FormErrors,
}

impl OrderDetailTemplate {
    async fn load(state: &AppState, layout: Layout, id: OrderId) -> Result<Self> {
        let orders = OrderRepository::new(state.pool());
        let order = orders
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

        let coupon_code = match order.order.coupon_id {
            Some(coupon_id) => orders.coupon_code(coupon_id).await?,
            None => None,
        };

        Ok(Self {
            layout,
            lines: orders.lines(id).await?,
            address: orders.address(order.order.shipping_address_id).await?,
            coupon_code,
            payment: orders.payment(id).await?,
            statuses: OrderStatus::ALL,
            status: order.order.status.as_str().to_string(),
            notes: order.order.notes.clone(),
            order,
            errors: FormErrors::default(),
        })
    }
}

/// Status filter from the query string; unknown values show every order.
fn parse_status_filter(raw: Option<&str>) -> Option<OrderStatus> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Order list with per-status counts.
#[instrument(skip(staff, state))]
pub async fn index(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<OrderListTemplate> {
    let orders = OrderRepository::new(state.pool());
    let status = parse_status_filter(query.status.as_deref());

    let request = PageRequest::parse(query.page.as_deref(), PER_PAGE);
    let total = orders.count(status).await?;
    request.check(total)?;
    let page = request.page(orders.list(status, &request).await?, total);

    let status = status.map(|s| s.as_str().to_string()).unwrap_or_default();
    let pagination = Pagination::new(&page, |n| {
        list_link("/orders", &[("status", Some(status.as_str()))], n)
    });

    Ok(OrderListTemplate {
        layout: Layout::new(staff, Section::Orders, &query.messages),
        status_counts: fill_status_counts(&orders.status_counts().await?),
        page,
        pagination,
        status,
    })
}

/// Order detail.
#[instrument(skip(staff, state))]
pub async fn show(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<MessageQuery>,
) -> Result<OrderDetailTemplate> {
    OrderDetailTemplate::load(&state, Layout::new(staff, Section::Orders, &query), id).await
}

/// Set an order's status and staff notes.
#[instrument(skip(staff, state, form), fields(staff_id = %staff.id))]
pub async fn update_status(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<OrderStatusForm>,
) -> Result<Response> {
    let notes = form.notes.trim();

    let Ok(status) = form.status.trim().parse::<OrderStatus>() else {
        let mut page =
            OrderDetailTemplate::load(&state, Layout::plain(staff, Section::Orders), id).await?;
        page.errors.add(
            "status",
            "Select a valid choice. That choice is not one of the available choices.",
        );
        page.status = form.status;
        page.notes = notes.to_string();
        return Ok(page.into_response());
    };

    match OrderRepository::new(state.pool())
        .update_status(id, status, notes)
        .await
    {
        Ok(()) => {}
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(format!("order {id}")));
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(order_id = %id, status = %status, "Order status updated");

    let target = with_message(&format!("/orders/{id}"), "success", "order_updated", "");
    Ok(Redirect::to(&target).into_response())
}
