//! Admin order board.

use std::sync::Arc;

use bazaar_core::{OrderId, OrderStatus};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::models::Order;
use crate::remote::RemoteDataService;
use crate::services::auth::SessionHolder;
use crate::services::catalog::{Catalog, ViewState};

/// The admin's list of every order and the status control on each row.
pub struct OrderBoard {
    remote: Arc<dyn RemoteDataService>,
    session: Arc<SessionHolder>,
    catalog: Arc<Catalog>,
    orders: ViewState<Vec<Order>>,
}

impl std::fmt::Debug for OrderBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBoard")
            .field("orders", &self.orders)
            .finish_non_exhaustive()
    }
}

impl OrderBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteDataService>,
        session: Arc<SessionHolder>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            remote,
            session,
            catalog,
            orders: ViewState::new(),
        }
    }

    /// Fetch every order into the board.
    ///
    /// # Errors
    ///
    /// See [`Catalog::all_orders`] and [`ViewState::load`].
    pub async fn load(&self) -> Result<Vec<Order>> {
        self.orders.load(|| self.catalog.all_orders()).await
    }

    /// The board's view state.
    #[must_use]
    pub const fn view(&self) -> &ViewState<Vec<Order>> {
        &self.orders
    }

    /// The board's current copy of one order.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders
            .status()
            .data()
            .and_then(|orders| orders.iter().find(|order| order.id == id).cloned())
    }

    /// Set an order's status.
    ///
    /// The remote row is updated first; then only that order's status
    /// changes in the board. Items and total are untouched and nothing is
    /// refetched. Any status may follow any other.
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-admins, otherwise the
    /// classified remote error (the board is left unchanged).
    #[instrument(skip(self))]
    pub async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        self.session.require_admin()?;
        self.remote.update_order_status(order_id, status).await?;

        let mut found = false;
        self.orders.update(|orders| {
            if let Some(order) = orders.iter_mut().find(|order| order.id == order_id) {
                order.status = status;
                found = true;
            }
        });
        if !found {
            debug!("Order not on the board, nothing to update locally");
        }

        info!("Order status updated");
        Ok(())
    }
}
