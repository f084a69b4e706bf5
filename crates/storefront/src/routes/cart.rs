//! Cart route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::ProductId;

use crate::db::CatalogRepository;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::Shopper;
use crate::routes::{Layout, MessageQuery};
use crate::services::cart::CartSummary;
use crate::state::AppState;

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub layout: Layout,
    pub summary: CartSummary,
}

/// Cart form data. `action` picks the operation.
#[derive(Debug, Deserialize)]
pub struct CartForm {
    pub action: String,
    pub product_id: Option<ProductId>,
    pub quantity: Option<String>,
    pub code: Option<String>,
}

/// What a cart form asks for.
#[derive(Debug, PartialEq, Eq)]
enum CartAction<'a> {
    Update { product_id: ProductId, quantity: i32 },
    Remove { product_id: ProductId },
    Coupon { code: &'a str },
}

impl CartForm {
    fn action(&self) -> Option<CartAction<'_>> {
        match self.action.as_str() {
            // Removing a line is the `remove` action's job
            "update" => Some(CartAction::Update {
                product_id: self.product_id?,
                quantity: self
                    .quantity
                    .as_deref()?
                    .trim()
                    .parse::<i32>()
                    .ok()?
                    .max(1),
            }),
            "remove" => Some(CartAction::Remove {
                product_id: self.product_id?,
            }),
            "coupon" => Some(CartAction::Coupon {
                code: self.code.as_deref().map(str::trim).unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Display the cart.
#[instrument(skip(state, shopper, query))]
pub async fn show(
    State(state): State<AppState>,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let summary = shopper.cart(state.pool()).await?.summary().await?;

    Ok(CartTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        summary,
    })
}

/// Update a quantity, remove a line or apply a coupon.
#[instrument(skip(state, shopper, form), fields(action = %form.action))]
pub async fn update(
    State(state): State<AppState>,
    shopper: Shopper,
    Form(form): Form<CartForm>,
) -> Result<Redirect> {
    let action = match form.action() {
        Some(action) => action,
        None if form.action == "update" => {
            return Ok(Redirect::to("/cart?error=invalid_quantity"));
        }
        None => return Err(AppError::BadRequest("unknown cart action".to_string())),
    };

    let mut cart = shopper.cart(state.pool()).await?;

    let target = match action {
        CartAction::Update {
            product_id,
            quantity,
        } => {
            let product = CatalogRepository::new(state.pool())
                .product_by_id(product_id)
                .await?;
            match product {
                Some(product) => {
                    cart.update_quantity(&product, quantity).await?;
                }
                // Products deactivated after being added can only be removed.
                None => {
                    cart.remove_product(product_id).await?;
                }
            }
            "/cart?success=cart_updated"
        }
        CartAction::Remove { product_id } => {
            cart.remove_product(product_id).await?;
            "/cart?success=item_removed"
        }
        CartAction::Coupon { code } => {
            if cart.apply_coupon(code).await?.is_some() {
                "/cart?success=coupon_applied"
            } else {
                "/cart?error=coupon_invalid"
            }
        }
    };

    Ok(Redirect::to(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(action: &str) -> CartForm {
        CartForm {
            action: action.to_string(),
            product_id: Some(ProductId::new(7)),
            quantity: Some("3".to_string()),
            code: Some(" SALE10 ".to_string()),
        }
    }

    #[test]
    fn test_update_action() {
        assert_eq!(
            form("update").action(),
            Some(CartAction::Update {
                product_id: ProductId::new(7),
                quantity: 3
            })
        );
    }

    #[test]
    fn test_update_with_bad_quantity() {
        let mut f = form("update");
        f.quantity = Some("lots".to_string());
        assert_eq!(f.action(), None);
    }

    #[test]
    fn test_update_quantity_is_at_least_one() {
        for raw in ["0", "-4"] {
            let mut f = form("update");
            f.quantity = Some(raw.to_string());
            assert_eq!(
                f.action(),
                Some(CartAction::Update {
                    product_id: ProductId::new(7),
                    quantity: 1
                }),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_coupon_code_is_trimmed() {
        assert_eq!(
            form("coupon").action(),
            Some(CartAction::Coupon { code: "SALE10" })
        );
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(form("explode").action(), None);
    }
}
