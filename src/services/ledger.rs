use {
    crate::domain::catalog::Catalog,
    crate::domain::error::CoreError,
    crate::domain::money::Money,
    crate::domain::order::{
        NewOrderRequest, Order, OrderNo, OrderStatus, OrderType, Refund, RefundStatus,
    },
    crate::store::{Completion, LedgerStore},
    chrono::{DateTime, Utc},
    std::sync::Arc,
};

/// Sole writer of order state. All transitions go through the store's
/// conditional updates, so concurrent duplicate deliveries collapse into
/// one winner and N benign "already paid" observations.
#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn Catalog>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn create_order(&self, req: NewOrderRequest) -> Result<Order, CoreError> {
        if req.money.amount().is_zero() {
            return Err(CoreError::Validation("order amount must be positive".into()));
        }

        match req.order_type {
            OrderType::Subscription => {
                if self.catalog.plan(&req.related_id).is_none() {
                    return Err(CoreError::Validation(format!(
                        "unknown plan: {}",
                        req.related_id
                    )));
                }
            }
            OrderType::Content => {
                // Duplicate-purchase guard: one paid order per (user, content).
                if self
                    .store
                    .has_paid_content_order(req.user_id, req.related_id)
                    .await?
                {
                    return Err(CoreError::Validation(format!(
                        "content {} already purchased",
                        req.related_id
                    )));
                }
            }
            OrderType::Tip => {}
        }

        let now = Utc::now();
        let order = Order {
            order_no: OrderNo::generate(now),
            user_id: req.user_id,
            order_type: req.order_type,
            related_id: req.related_id,
            money: req.money,
            payment_method: req.payment_method,
            status: OrderStatus::Pending,
            external_txn_id: None,
            paid_at: None,
            refund: None,
            failure_reason: None,
            description: req.description,
            created_at: now,
        };

        self.store.insert_order(order.clone()).await?;
        tracing::info!(order_no = %order.order_no, order_type = %order.order_type, "order created");
        Ok(order)
    }

    pub async fn order(&self, order_no: &OrderNo) -> Result<Option<Order>, CoreError> {
        self.store.order(order_no).await
    }

    /// Look up the order a gateway transaction was credited to, the
    /// support-side entry point when all you have is the provider's id.
    pub async fn order_by_txn(&self, txn_id: &str) -> Result<Option<Order>, CoreError> {
        self.store.order_by_txn(txn_id).await
    }

    /// Idempotent `pending → paid`. A duplicate delivery (or a losing
    /// concurrent attempt) comes back as `AlreadyPaid` — never an error,
    /// never a second set of side effects. Paying an order in a terminal
    /// non-paid state is a Conflict.
    pub async fn complete_order(
        &self,
        order_no: &OrderNo,
        txn_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Completion, CoreError> {
        match self.store.complete_if_pending(order_no, txn_id, paid_at).await? {
            Completion::Terminal(status) => Err(CoreError::Conflict(format!(
                "cannot pay order {order_no} in state {status}"
            ))),
            other => Ok(other),
        }
    }

    /// Record an externally confirmed payment for which no pending order
    /// exists (renewals, restored purchases). Same idempotency key.
    pub async fn record_paid_order(&self, order: Order) -> Result<Completion, CoreError> {
        self.store.insert_paid_order(order).await
    }

    /// `pending → failed`. No-op (false) when the order already left pending.
    pub async fn fail_order(&self, order_no: &OrderNo, reason: &str) -> Result<bool, CoreError> {
        self.store
            .terminate_if_pending(order_no, OrderStatus::Failed, reason)
            .await
    }

    /// `pending → cancelled`. No-op (false) when already terminal.
    pub async fn cancel_order(&self, order_no: &OrderNo, reason: &str) -> Result<bool, CoreError> {
        self.store
            .terminate_if_pending(order_no, OrderStatus::Cancelled, reason)
            .await
    }

    /// `paid → refunded`, amount-capped. The refund sub-record lands as
    /// `processed` together with the state flip.
    pub async fn refund_order(
        &self,
        order_no: &OrderNo,
        amount: Money,
        reason: &str,
    ) -> Result<Order, CoreError> {
        let order = self
            .store
            .order(order_no)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("unknown order: {order_no}")))?;

        if amount.currency() != order.money.currency() {
            return Err(CoreError::Validation(format!(
                "refund currency {} does not match order currency {}",
                amount.currency(),
                order.money.currency()
            )));
        }
        if amount.amount().is_zero() {
            return Err(CoreError::Validation("refund amount must be positive".into()));
        }
        if amount.amount() > order.money.amount() {
            return Err(CoreError::Conflict(format!(
                "refund {} exceeds order amount {}",
                amount.amount(),
                order.money.amount()
            )));
        }

        let refund = Refund {
            amount,
            reason: reason.to_string(),
            requested_at: Utc::now(),
            processed_at: None,
            status: RefundStatus::Pending,
        };

        match self.store.refund_if_paid(order_no, refund).await? {
            Some(refunded) => {
                tracing::info!(order_no = %order_no, amount = %amount.amount(), "order refunded");
                Ok(refunded)
            }
            None => Err(CoreError::Conflict(format!(
                "cannot refund order {order_no} in state {}",
                order.status
            ))),
        }
    }
}
