pub mod api_errors;
pub mod http;
pub mod receipt;
pub mod wallet;

use {
    crate::domain::error::AdapterError,
    crate::domain::event::PaymentEvent,
    chrono::{DateTime, Utc},
    std::{future::Future, pin::Pin},
};

/// Raw provider notification as the HTTP layer received it.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub body: String,
    /// Signature header, when the provider signs its webhooks.
    pub signature: Option<String>,
    pub received_at: DateTime<Utc>,
}

pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AdapterError>> + Send + 'a>>;

/// Normalizes one provider's payloads into canonical payment events.
/// Adapters never mutate the ledger; an empty result means the payload was
/// valid but carried nothing to reconcile.
pub trait GatewayAdapter: Send + Sync {
    fn provider(&self) -> &'static str;

    fn normalize(&self, raw: &RawNotification) -> AdapterFuture<'_, Vec<PaymentEvent>>;
}
