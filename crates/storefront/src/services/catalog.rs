//! Catalog and order reads, plus per-view fetch state.
//!
//! Each view owns a [`ViewState`]. Starting a new fetch for a view cancels
//! the one in flight, and only the latest fetch may write to the view, so a
//! slow response can never overwrite a newer one.

use std::future::Future;
use std::sync::Arc;

use bazaar_core::{ProductId, UserId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::models::{Order, Product};
use crate::remote::RemoteDataService;
use crate::services::auth::SessionHolder;

// =============================================================================
// ViewState
// =============================================================================

/// What a view currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewStatus<T> {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The latest fetch succeeded.
    Loaded(T),
    /// The latest fetch failed; the message is what the view displays.
    Failed(String),
}

impl<T> ViewStatus<T> {
    /// Loaded data, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Loaded(data) => Some(data),
            _ => None,
        }
    }
}

struct ViewInner<T> {
    generation: u64,
    in_flight: Option<CancellationToken>,
    status: ViewStatus<T>,
}

/// Fetch state of one view.
pub struct ViewState<T> {
    inner: Mutex<ViewInner<T>>,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ViewInner {
                generation: 0,
                in_flight: None,
                status: ViewStatus::Idle,
            }),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ViewState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ViewState")
            .field("generation", &inner.generation)
            .field("status", &inner.status)
            .finish()
    }
}

impl<T: Clone> ViewState<T> {
    /// Create an idle view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of what the view shows.
    #[must_use]
    pub fn status(&self) -> ViewStatus<T> {
        self.inner.lock().status.clone()
    }

    /// Run `fetch` as this view's current fetch.
    ///
    /// Any fetch already in flight is cancelled. The result is applied to
    /// the view only if no newer fetch started meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if this fetch was superseded or the
    /// view was torn down; otherwise whatever `fetch` returned.
    pub async fn load<F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (generation, token) = self.begin();

        let result = tokio::select! {
            biased;
            () = token.cancelled() => return Err(AppError::Cancelled),
            result = fetch() => result,
        };

        let mut inner = self.inner.lock();
        if token.is_cancelled() || inner.generation != generation {
            debug!(generation, "Discarding superseded fetch");
            return Err(AppError::Cancelled);
        }
        inner.in_flight = None;

        match &result {
            Ok(data) => inner.status = ViewStatus::Loaded(data.clone()),
            Err(e) if e.is_silent() => {}
            Err(e) => inner.status = ViewStatus::Failed(e.user_message()),
        }
        result
    }

    /// Cancel the fetch in flight, if any. Called when the view goes away.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.in_flight.take() {
            token.cancel();
        }
        inner.generation += 1;
    }

    /// Edit loaded data in place. Returns `false` when nothing is loaded.
    pub fn update(&self, edit: impl FnOnce(&mut T)) -> bool {
        let mut inner = self.inner.lock();
        match &mut inner.status {
            ViewStatus::Loaded(data) => {
                edit(data);
                true
            }
            _ => false,
        }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.in_flight.take() {
            previous.cancel();
        }
        inner.generation += 1;
        let token = CancellationToken::new();
        inner.in_flight = Some(token.clone());
        inner.status = ViewStatus::Loading;
        (inner.generation, token)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Read access to products and orders.
pub struct Catalog {
    remote: Arc<dyn RemoteDataService>,
    session: Arc<SessionHolder>,
    product_list: ViewState<Vec<Product>>,
    product_detail: ViewState<Option<Product>>,
    my_orders: ViewState<Vec<Order>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("product_list", &self.product_list)
            .field("product_detail", &self.product_detail)
            .field("my_orders", &self.my_orders)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Create a catalog reader.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteDataService>, session: Arc<SessionHolder>) -> Self {
        Self {
            remote,
            session,
            product_list: ViewState::new(),
            product_detail: ViewState::new(),
            my_orders: ViewState::new(),
        }
    }

    /// All products, newest first.
    ///
    /// # Errors
    ///
    /// Returns the classified remote error.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.remote.list_products().await?)
    }

    /// One product; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the classified remote error.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        match self.remote.get_product(id).await {
            Ok(product) => Ok(product),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// One buyer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns the classified remote error.
    #[instrument(skip(self))]
    pub async fn orders_for(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.remote.list_orders(Some(user_id)).await?)
    }

    /// Orders of the signed-in buyer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` without a session, otherwise the
    /// classified remote error.
    pub async fn my_orders(&self) -> Result<Vec<Order>> {
        let identity = self.session.require_identity()?;
        self.orders_for(identity.id).await
    }

    /// Every order (admin only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-admins, otherwise the
    /// classified remote error.
    #[instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.session.require_admin()?;
        Ok(self.remote.list_orders(None).await?)
    }

    /// Load the product list view.
    ///
    /// # Errors
    ///
    /// See [`ViewState::load`].
    pub async fn load_products(&self) -> Result<Vec<Product>> {
        self.product_list.load(|| self.products()).await
    }

    /// Load the product detail view.
    ///
    /// # Errors
    ///
    /// See [`ViewState::load`].
    pub async fn load_product(&self, id: &ProductId) -> Result<Option<Product>> {
        self.product_detail.load(|| self.product(id)).await
    }

    /// Load the buyer's order history view.
    ///
    /// # Errors
    ///
    /// See [`ViewState::load`].
    pub async fn load_my_orders(&self) -> Result<Vec<Order>> {
        self.my_orders.load(|| self.my_orders()).await
    }

    /// Product list view.
    #[must_use]
    pub const fn product_list(&self) -> &ViewState<Vec<Product>> {
        &self.product_list
    }

    /// Product detail view.
    #[must_use]
    pub const fn product_detail(&self) -> &ViewState<Option<Product>> {
        &self.product_detail
    }

    /// Order history view.
    #[must_use]
    pub const fn my_orders_view(&self) -> &ViewState<Vec<Order>> {
        &self.my_orders
    }
}
