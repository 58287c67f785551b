//! Storefront context shared across views.

use std::sync::Arc;

use bazaar_core::OrderId;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::error::{self, Result};
use crate::models::Product;
use crate::remote::{RemoteDataService, RestClient};
use crate::services::{
    AddressForm, Catalog, CheckoutOrchestrator, OrderBoard, ProductWriter, SessionHolder,
};
use crate::storage::{FileStorage, LocalStorage};

/// Everything a front end needs, built once at startup.
///
/// This struct is cheaply cloneable via `Arc`. The cart sits behind an
/// async mutex that is never held across a remote call; a separate lock
/// lets only one checkout run at a time.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    session: Arc<SessionHolder>,
    cart: Mutex<CartStore>,
    checkout_lock: Mutex<()>,
    catalog: Arc<Catalog>,
    products: ProductWriter,
    checkout: CheckoutOrchestrator,
    order_board: OrderBoard,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("config", &self.inner.config)
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

impl Storefront {
    /// Wire a context from its collaborators. The session starts signed
    /// out and the cart is loaded from `storage`.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        remote: Arc<dyn RemoteDataService>,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        let session = Arc::new(SessionHolder::new(remote.clone(), storage.clone()));
        let cart = Mutex::new(CartStore::load(storage));
        let catalog = Arc::new(Catalog::new(remote.clone(), session.clone()));
        let products = ProductWriter::new(
            remote.clone(),
            session.clone(),
            config.image_bucket.clone(),
            config.schema_policy,
        );
        let checkout = CheckoutOrchestrator::new(remote.clone(), session.clone());
        let order_board = OrderBoard::new(remote, session.clone(), catalog.clone());

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                session,
                cart,
                checkout_lock: Mutex::new(()),
                catalog,
                products,
                checkout,
                order_board,
            }),
        }
    }

    /// Build the HTTP client and file storage from `config`, then restore
    /// any saved session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the data
    /// directory cannot be created.
    pub async fn connect(config: StorefrontConfig) -> Result<Self> {
        let remote: Arc<dyn RemoteDataService> = Arc::new(RestClient::new(&config.remote)?);
        let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::open(&config.data_dir)?);

        let storefront = Self::new(config, remote, storage);
        let identity = storefront.inner.session.restore().await;
        info!(
            signed_in = identity.is_some(),
            cart_units = storefront.inner.cart.lock().await.count(),
            "Storefront ready"
        );
        Ok(storefront)
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the session holder.
    #[must_use]
    pub fn session(&self) -> &SessionHolder {
        &self.inner.session
    }

    /// Get a reference to the cart.
    #[must_use]
    pub fn cart(&self) -> &Mutex<CartStore> {
        &self.inner.cart
    }

    /// Get a reference to the catalog reader.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Get a reference to the admin product writer.
    #[must_use]
    pub fn products(&self) -> &ProductWriter {
        &self.inner.products
    }

    /// Get a reference to the checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }

    /// Get a reference to the admin order board.
    #[must_use]
    pub fn order_board(&self) -> &OrderBoard {
        &self.inner.order_board
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the cart snapshot cannot be written.
    pub async fn add_to_cart(&self, product: Product, quantity: u32) -> Result<()> {
        let product_id = product.id.to_string();
        error::add_breadcrumb("cart", "Added to cart", Some(&[("product_id", product_id.as_str())]));
        self.inner.cart.lock().await.add(product, quantity)
    }

    /// Check out the current cart.
    ///
    /// The cart stays usable while the order call is in flight. On success
    /// the ordered units are taken out of the cart; anything added in the
    /// meantime is kept.
    ///
    /// # Errors
    ///
    /// See [`CheckoutOrchestrator::place_order`].
    pub async fn place_order(&self, form: &AddressForm) -> Result<OrderId> {
        let _checkout = self.inner.checkout_lock.lock().await;
        let request = {
            let cart = self.inner.cart.lock().await;
            self.inner.checkout.prepare(&cart, form)?
        };

        let order_id = self.inner.checkout.submit(&request).await?;

        let ordered = request.items.iter().map(|item| (&item.product_id, item.quantity));
        if let Err(e) = self.inner.cart.lock().await.deduct(ordered) {
            // The order already exists.
            warn!(error = %e, %order_id, "Failed to persist cart after checkout");
        }
        Ok(order_id)
    }
}
