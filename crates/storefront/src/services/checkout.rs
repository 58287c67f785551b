//! Checkout: turn the cart into an order.
//!
//! The orchestrator checks its preconditions locally, then hands one
//! request to the remote order procedure, which owns stock checks and
//! atomicity. The cart is cleared only after the procedure succeeds.

use std::sync::Arc;

use bazaar_core::{Address, AddressInput, AddressType, DEFAULT_COUNTRY, OrderId, Price};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cart::CartStore;
use crate::error::{self, AppError, Result};
use crate::remote::{PlaceOrderItem, PlaceOrderRequest, RemoteDataService};
use crate::services::auth::SessionHolder;

/// Shipping address fields as typed into the checkout form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressForm {
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub address_type: AddressType,
}

impl Default for AddressForm {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            phone: String::new(),
            address_line1: String::new(),
            address_line2: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            country: DEFAULT_COUNTRY.to_string(),
            address_type: AddressType::Home,
        }
    }
}

impl AddressForm {
    /// Validate the form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the first problem.
    pub fn validate(&self) -> Result<Address> {
        let input = AddressInput {
            full_name: &self.full_name,
            phone: &self.phone,
            address_line1: &self.address_line1,
            address_line2: &self.address_line2,
            city: &self.city,
            state: &self.state,
            postal_code: &self.postal_code,
            country: &self.country,
            address_type: self.address_type,
        };
        Ok(Address::validate(&input)?)
    }
}

/// Figures shown next to the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub item_count: u32,
    pub subtotal: Price,
    pub delivery: Price,
    pub total: Price,
}

/// Places orders for the signed-in buyer.
pub struct CheckoutOrchestrator {
    remote: Arc<dyn RemoteDataService>,
    session: Arc<SessionHolder>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator").finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteDataService>, session: Arc<SessionHolder>) -> Self {
        Self { remote, session }
    }

    /// Summary of the cart for display. Delivery is free.
    #[must_use]
    pub fn summary(cart: &CartStore) -> OrderSummary {
        let subtotal = cart.total();
        OrderSummary {
            item_count: cart.count(),
            subtotal,
            delivery: Price::ZERO,
            total: subtotal + Price::ZERO,
        }
    }

    /// Build the order request without sending it.
    ///
    /// Checks, in order: someone is signed in, the cart has items, the
    /// address is valid. None of these contact the remote service.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn`, `AppError::EmptyCart` or
    /// `AppError::Validation`.
    pub fn prepare(&self, cart: &CartStore, form: &AddressForm) -> Result<PlaceOrderRequest> {
        let identity = self.session.require_identity()?;
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }
        let address = form.validate()?;

        let items = cart
            .items()
            .iter()
            .map(|item| PlaceOrderItem {
                product_id: item.product.id.clone(),
                quantity: item.quantity,
                unit_price: item.product.price,
            })
            .collect();

        Ok(PlaceOrderRequest {
            buyer_id: identity.id,
            buyer_email: identity.email,
            address,
            items,
        })
    }

    /// Place an order for everything in the cart.
    ///
    /// On success the cart is cleared and the new order's ID returned. On
    /// failure the cart is untouched and the service's message (for example
    /// an insufficient-stock rejection) is surfaced as is.
    ///
    /// # Errors
    ///
    /// Any precondition error from [`CheckoutOrchestrator::prepare`], or
    /// the classified remote error.
    #[instrument(skip_all, fields(entries = cart.items().len()))]
    pub async fn place_order(&self, cart: &mut CartStore, form: &AddressForm) -> Result<OrderId> {
        let request = self.prepare(cart, form)?;
        let order_id = self.submit(&request).await?;

        if let Err(e) = cart.clear() {
            // The order already exists.
            warn!(error = %e, %order_id, "Failed to persist cleared cart");
        }
        Ok(order_id)
    }

    /// Send a prepared order to the remote order procedure.
    ///
    /// Does not touch the cart, so the caller need not hold it while the
    /// call is in flight.
    ///
    /// # Errors
    ///
    /// Returns the classified remote error.
    #[instrument(skip_all, fields(items = request.items.len()))]
    pub async fn submit(&self, request: &PlaceOrderRequest) -> Result<OrderId> {
        let total = request.total();
        let total_text = total.to_string();
        error::add_breadcrumb("checkout", "Placing order", Some(&[("total", total_text.as_str())]));

        let order_id = self.remote.place_order(request).await?;
        info!(%order_id, %total, "Order placed");
        Ok(order_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bazaar_core::AddressError;

    use crate::error::ValidationError;

    fn form() -> AddressForm {
        AddressForm {
            full_name: "Asha Rao".to_string(),
            phone: "9876543210".to_string(),
            address_line1: "12 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            postal_code: "560001".to_string(),
            ..AddressForm::default()
        }
    }

    #[test]
    fn test_form_defaults() {
        let form = AddressForm::default();
        assert_eq!(form.country, "India");
        assert_eq!(form.address_type, AddressType::Home);
    }

    #[test]
    fn test_valid_form() {
        let address = form().validate().unwrap();
        assert_eq!(address.country, "India");
        assert_eq!(address.address_line2, None);
    }

    #[test]
    fn test_blank_city_rejected() {
        let form = AddressForm {
            city: "  ".to_string(),
            ..form()
        };
        assert!(matches!(
            form.validate(),
            Err(AppError::Validation(ValidationError::Address(
                AddressError::MissingField("city")
            )))
        ));
    }

    #[test]
    fn test_short_phone_rejected() {
        let form = AddressForm {
            phone: "12345".to_string(),
            ..form()
        };
        assert!(matches!(
            form.validate(),
            Err(AppError::Validation(ValidationError::Address(AddressError::Phone(_))))
        ));
    }
}
