pub mod admin;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
pub mod wallet;

use std::sync::Arc;

use crate::services::orders::OrderService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::wallet::WalletVerifier;
use crate::store::ProductCatalog;

/// Service layer handed to every handler through [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub reconciliation: Arc<ReconciliationService>,
    /// Absent when the regional wallet gateway is not configured.
    pub wallet: Option<Arc<dyn WalletVerifier>>,
    pub catalog: Arc<dyn ProductCatalog>,
}
