//! Checkout and order confirmation route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::OrderId;
use bozor_core::models::{Address, Order};

use crate::db::addresses::{NewAddress, limits};
use crate::db::orders::OrderLine;
use crate::db::{AddressRepository, OrderRepository};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{RequireAuth, Shopper};
use crate::routes::{FormErrors, Layout, MessageQuery, checkbox};
use crate::services::cart::CartSummary;
use crate::services::checkout::{CheckoutError, checkout_cart};
use crate::state::AppState;

/// Country used when the form leaves it blank.
pub const DEFAULT_COUNTRY: &str = "UZ";

/// Checkout form: shipping address fields (prefixed `address-`) and notes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(rename = "address-full_name", default)]
    pub full_name: String,
    #[serde(rename = "address-phone", default)]
    pub phone: String,
    #[serde(rename = "address-line1", default)]
    pub line1: String,
    #[serde(rename = "address-line2", default)]
    pub line2: String,
    #[serde(rename = "address-city", default)]
    pub city: String,
    #[serde(rename = "address-region", default)]
    pub region: String,
    #[serde(rename = "address-postal_code", default)]
    pub postal_code: String,
    #[serde(rename = "address-country", default)]
    pub country: String,
    #[serde(rename = "address-is_default")]
    pub is_default: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl CheckoutForm {
    /// Prefill from the user's saved address.
    fn from_address(address: &Address) -> Self {
        Self {
            full_name: address.full_name.clone(),
            phone: address.phone.clone(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            region: address.region.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            is_default: None,
            notes: String::new(),
        }
    }

    /// Validate into an address, collecting every field error.
    fn validate(&self) -> std::result::Result<NewAddress, FormErrors> {
        let mut errors = FormErrors::default();

        let required = [
            ("full_name", &self.full_name, limits::FULL_NAME),
            ("phone", &self.phone, limits::PHONE),
            ("line1", &self.line1, limits::LINE),
            ("city", &self.city, limits::CITY),
        ];
        for (field, value, max) in required {
            let value = value.trim();
            if value.is_empty() {
                errors.add(field, "This field is required.");
            } else if value.chars().count() > max {
                errors.add(field, format!("Ensure this value has at most {max} characters."));
            }
        }

        let optional = [
            ("line2", &self.line2, limits::LINE),
            ("region", &self.region, limits::REGION),
            ("postal_code", &self.postal_code, limits::POSTAL_CODE),
        ];
        for (field, value, max) in optional {
            if value.trim().chars().count() > max {
                errors.add(field, format!("Ensure this value has at most {max} characters."));
            }
        }

        let country = match self.country.trim() {
            "" => DEFAULT_COUNTRY.to_string(),
            code => code.to_ascii_uppercase(),
        };
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
            errors.add("country", "Enter a two-letter country code.");
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewAddress {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            line1: self.line1.trim().to_string(),
            line2: self.line2.trim().to_string(),
            city: self.city.trim().to_string(),
            region: self.region.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            country,
            is_default: checkbox(self.is_default.as_deref()),
        })
    }
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/form.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub summary: CartSummary,
    pub form: CheckoutForm,
    pub errors: FormErrors,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct OrderSuccessTemplate {
    pub layout: Layout,
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub address: Option<Address>,
}

/// Display the checkout form.
#[instrument(skip(state, shopper, user, query), fields(user_id = %user.id))]
pub async fn page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    let summary = shopper.cart(state.pool()).await?.summary().await?;
    if summary.is_empty() {
        return Ok(Redirect::to("/cart?warning=empty_cart").into_response());
    }

    let addresses = AddressRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    let form = addresses
        .first()
        .map_or_else(CheckoutForm::default, CheckoutForm::from_address);

    Ok(CheckoutTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        summary,
        form,
        errors: FormErrors::default(),
    }
    .into_response())
}

/// Save the shipping address and place the order.
#[instrument(skip(state, shopper, user, form), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    shopper: Shopper,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let cart = shopper.cart(state.pool()).await?;
    let summary = cart.summary().await?;
    if summary.is_empty() {
        return Ok(Redirect::to("/cart?warning=empty_cart").into_response());
    }

    let address = match form.validate() {
        Ok(address) => address,
        Err(errors) => {
            return Ok(CheckoutTemplate {
                layout: Layout::new(&state, &shopper, &MessageQuery::default()).await,
                summary,
                form,
                errors,
            }
            .into_response());
        }
    };

    let address = AddressRepository::new(state.pool())
        .create(user.id, &address)
        .await?;

    match checkout_cart(state.pool(), cart.cart(), user.id, address.id, form.notes.trim()).await {
        Ok(order) => {
            add_breadcrumb(
                "checkout",
                "Order placed",
                Some(&[("order_id", &order.id.to_string())]),
            );
            Ok(Redirect::to(&format!("/order-success/{}?success=order_placed", order.id))
                .into_response())
        }
        Err(CheckoutError::EmptyCart) => Ok(Redirect::to("/cart?error=empty_cart").into_response()),
        Err(CheckoutError::InsufficientStock(name)) => {
            tracing::info!(product = %name, "Checkout refused: insufficient stock");
            Ok(Redirect::to(&format!(
                "/cart?error=insufficient_stock&detail={}",
                urlencoding::encode(&name)
            ))
            .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Order confirmation, visible to the order's owner only.
#[instrument(skip(state, shopper, user, query), fields(user_id = %user.id))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    shopper: Shopper,
    Path(order_id): Path<OrderId>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let orders = OrderRepository::new(state.pool());
    let order = orders
        .get_for_user(user.id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    let lines = orders.lines(order.id).await?;
    let address = AddressRepository::new(state.pool())
        .get(order.shipping_address_id)
        .await?;

    Ok(OrderSuccessTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        order,
        lines,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CheckoutForm {
        CheckoutForm {
            full_name: " Aziza Karimova ".to_string(),
            phone: "+998901234567".to_string(),
            line1: "Amir Temur ko'chasi 5".to_string(),
            city: "Toshkent".to_string(),
            ..CheckoutForm::default()
        }
    }

    #[test]
    fn test_valid_form_defaults_country() {
        let address = form().validate().unwrap_or_else(|_| panic!("form should be valid"));
        assert_eq!(address.full_name, "Aziza Karimova");
        assert_eq!(address.country, DEFAULT_COUNTRY);
        assert!(!address.is_default);
    }

    #[test]
    fn test_country_is_uppercased() {
        let mut f = form();
        f.country = "kz".to_string();
        f.is_default = Some("on".to_string());
        let address = f.validate().unwrap_or_else(|_| panic!("form should be valid"));
        assert_eq!(address.country, "KZ");
        assert!(address.is_default);
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = CheckoutForm::default()
            .validate()
            .err()
            .unwrap_or_else(|| panic!("form should be invalid"));
        assert_eq!(errors.get("full_name").len(), 1);
        assert_eq!(errors.get("phone").len(), 1);
        assert_eq!(errors.get("line1").len(), 1);
        assert_eq!(errors.get("city").len(), 1);
        assert!(errors.get("country").is_empty());
    }

    #[test]
    fn test_bad_country() {
        let mut f = form();
        f.country = "UZB".to_string();
        let errors = f.validate().err().unwrap_or_else(|| panic!("form should be invalid"));
        assert_eq!(errors.get("country").len(), 1);
    }

    #[test]
    fn test_lengths_match_address_columns() {
        let fields: [(&str, usize, fn(&mut CheckoutForm) -> &mut String); 7] = [
            ("full_name", limits::FULL_NAME, |f| &mut f.full_name),
            ("phone", limits::PHONE, |f| &mut f.phone),
            ("line1", limits::LINE, |f| &mut f.line1),
            ("line2", limits::LINE, |f| &mut f.line2),
            ("city", limits::CITY, |f| &mut f.city),
            ("region", limits::REGION, |f| &mut f.region),
            ("postal_code", limits::POSTAL_CODE, |f| &mut f.postal_code),
        ];
        for (field, max, value) in fields {
            let mut f = form();
            *value(&mut f) = "x".repeat(max);
            assert!(f.validate().is_ok(), "{field} at {max} should pass");

            *value(&mut f) = "x".repeat(max + 1);
            let errors = f.validate().err().unwrap_or_else(|| panic!("{field} over {max}"));
            assert_eq!(errors.get(field).len(), 1, "{field}");
        }
    }
}
