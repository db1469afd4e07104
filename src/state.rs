//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use crate::messaging::EventPublisher;
use crate::payments::{PaymentError, StripeClient};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenKeys,
    pub stripe: Option<StripeClient>,
    pub events: EventPublisher,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig, events: EventPublisher) -> Result<Self, PaymentError> {
        let tokens = TokenKeys::new(&config.secret_key, config.access_token_ttl_secs, config.refresh_token_ttl_secs);
        let stripe = StripeClient::from_config(&config.stripe)?;
        Ok(Self { store, config: Arc::new(config), tokens, stripe, events })
    }

    pub fn stripe(&self) -> Result<&StripeClient, PaymentError> {
        self.stripe.as_ref().ok_or(PaymentError::NotConfigured)
    }
}
