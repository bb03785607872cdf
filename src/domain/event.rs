use {
    super::money::Money,
    super::order::OrderNo,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Purchase,
    Renewal,
    Cancellation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Renewal => "renewal",
            Self::Cancellation => "cancellation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized notification of a payment occurrence. Every gateway adapter
/// emits this shape, so the reconciliation engine never inspects
/// provider-specific payloads.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Adapter that produced the event ("wallet", "appstore", ...).
    pub provider: String,
    /// Gateway-assigned transaction id — the idempotency key.
    pub external_txn_id: String,
    /// Present on renewals/cancellations; links back to the subscription
    /// opened by the original purchase.
    pub original_txn_id: Option<String>,
    /// Merchant order number carried out of band through the gateway.
    pub order_no: Option<OrderNo>,
    /// Buyer, when the provider reports it (in-app receipts do).
    pub user_id: Option<Uuid>,
    /// Amount as reported by the provider. Informational only — catalog
    /// pricing is authoritative for synthesized orders.
    pub money: Option<Money>,
    /// Provider product identifier (reverse-DNS style), used to match
    /// in-app purchases to a catalog plan.
    pub product_id: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub kind: EventKind,
}

/// What `reconcile` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Order transitioned to paid; downstream effects ran.
    Completed(OrderNo),
    /// Transaction already applied — no side effects this time.
    Duplicate(OrderNo),
    /// No pending order matched; one was synthesized directly as paid
    /// (restored or out-of-band purchase).
    Restored(OrderNo),
    /// Subscription extended by one plan period.
    Renewed(OrderNo),
    /// Subscription cancelled (or confirmed already cancelled).
    Cancelled(Uuid),
    /// Renewal/cancellation that no known subscription matches. Logged
    /// and dropped — non-fatal.
    Orphaned,
}
