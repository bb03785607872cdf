use {
    super::{ledger::OrderLedger, lifecycle::SubscriptionManager, splitter::RevenueSplitter},
    crate::domain::catalog::Catalog,
    crate::domain::error::CoreError,
    crate::domain::event::{EventKind, PaymentEvent, ReconcileOutcome},
    crate::domain::order::{Order, OrderNo, OrderStatus, OrderType},
    crate::store::{Completion, LedgerStore},
    chrono::Utc,
    std::sync::Arc,
};

/// Orchestrates one normalized payment event end to end: match or create
/// the order, apply the idempotent paid transition, then run the split and
/// subscription effects exactly once. Every write is keyed on the external
/// (or original) transaction id, so the whole call is safe to retry after
/// a store error.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn Catalog>,
    ledger: OrderLedger,
    splitter: RevenueSplitter,
    subscriptions: SubscriptionManager,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn Catalog>,
        ledger: OrderLedger,
        splitter: RevenueSplitter,
        subscriptions: SubscriptionManager,
    ) -> Self {
        Self {
            store,
            catalog,
            ledger,
            splitter,
            subscriptions,
        }
    }

    pub async fn reconcile(&self, event: &PaymentEvent) -> Result<ReconcileOutcome, CoreError> {
        match event.kind {
            EventKind::Purchase => self.reconcile_purchase(event).await,
            EventKind::Renewal => self.reconcile_renewal(event).await,
            EventKind::Cancellation => self.reconcile_cancellation(event).await,
        }
    }

    async fn reconcile_purchase(
        &self,
        event: &PaymentEvent,
    ) -> Result<ReconcileOutcome, CoreError> {
        // Merchant order reference carried through the gateway wins.
        if let Some(order_no) = &event.order_no {
            return self.complete_and_apply(order_no, event).await;
        }

        // In-app purchases carry no merchant reference: match by buyer and
        // product against a pending order.
        let (user_id, product_id) = match (event.user_id, event.product_id.as_deref()) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                return Err(CoreError::Validation(
                    "purchase event carries neither order reference nor buyer/product".into(),
                ));
            }
        };

        let plan = self.catalog.plan_by_product(product_id).ok_or_else(|| {
            CoreError::Validation(format!("unknown product: {product_id}"))
        })?;

        if let Some(pending) = self.store.pending_order_for(user_id, plan.plan_id).await? {
            return self.complete_and_apply(&pending.order_no, event).await;
        }

        // No pending order: a restored or out-of-band purchase. Synthesize
        // the order directly as paid. Price comes from the catalog; the
        // receipt's reported price is never trusted.
        let now = Utc::now();
        let order = Order {
            order_no: OrderNo::generate(now),
            user_id,
            order_type: OrderType::Subscription,
            related_id: plan.plan_id,
            money: plan.price,
            payment_method: event.provider.clone(),
            status: OrderStatus::Paid,
            external_txn_id: Some(event.external_txn_id.clone()),
            paid_at: Some(event.purchased_at),
            refund: None,
            failure_reason: None,
            description: "restored purchase".into(),
            created_at: now,
        };

        match self.ledger.record_paid_order(order).await? {
            Completion::Applied(order) => {
                self.apply_downstream(&order, event).await?;
                tracing::info!(order_no = %order.order_no, txn_id = %event.external_txn_id, "out-of-band purchase restored");
                Ok(ReconcileOutcome::Restored(order.order_no))
            }
            Completion::AlreadyPaid(existing) => {
                // Lost race, or a redelivery after a partial failure
                // downstream; the effects are no-ops once applied.
                self.apply_downstream(&existing, event).await?;
                tracing::info!(txn_id = %event.external_txn_id, "duplicate delivery, already credited");
                Ok(ReconcileOutcome::Duplicate(existing.order_no))
            }
            Completion::Terminal(status) => Err(CoreError::Conflict(format!(
                "synthesized order landed in unexpected state {status}"
            ))),
        }
    }

    async fn complete_and_apply(
        &self,
        order_no: &OrderNo,
        event: &PaymentEvent,
    ) -> Result<ReconcileOutcome, CoreError> {
        match self
            .ledger
            .complete_order(order_no, &event.external_txn_id, event.purchased_at)
            .await?
        {
            Completion::Applied(order) => {
                self.apply_downstream(&order, event).await?;
                tracing::info!(order_no = %order.order_no, txn_id = %event.external_txn_id, "order reconciled as paid");
                Ok(ReconcileOutcome::Completed(order.order_no))
            }
            Completion::AlreadyPaid(order) => {
                // A true duplicate, a losing concurrent attempt, or a
                // redelivery after the paid transition landed but a
                // downstream effect did not. Re-running the effects is how
                // the missing ones land; each is a no-op once applied.
                self.apply_downstream(&order, event).await?;
                tracing::info!(order_no = %order.order_no, txn_id = %event.external_txn_id, "duplicate delivery, already credited");
                Ok(ReconcileOutcome::Duplicate(order.order_no))
            }
            Completion::Terminal(status) => Err(CoreError::Conflict(format!(
                "cannot pay order {order_no} in state {status}"
            ))),
        }
    }

    /// Post-completion side effects. Each is individually idempotent (the
    /// split by the (order, creator) uniqueness guard, the renewal by the
    /// subscription's `last_order_no`), so duplicates and retries after a
    /// partial failure both converge.
    async fn apply_downstream(&self, order: &Order, event: &PaymentEvent) -> Result<(), CoreError> {
        // A duplicate can reference an order that has since been refunded;
        // its effects are settled history, not something to re-run.
        if order.status != OrderStatus::Paid {
            return Ok(());
        }

        self.splitter.split(order).await?;

        if order.order_type == OrderType::Subscription {
            // Renewal notices reference the original transaction; anchor the
            // subscription on it (falling back to this purchase's own id).
            let origin = event
                .original_txn_id
                .clone()
                .or_else(|| Some(event.external_txn_id.clone()));
            self.subscriptions
                .activate_or_renew(order.user_id, order.related_id, order, origin, Utc::now())
                .await?;
        }
        Ok(())
    }

    async fn reconcile_renewal(&self, event: &PaymentEvent) -> Result<ReconcileOutcome, CoreError> {
        let origin = event.original_txn_id.as_deref().ok_or_else(|| {
            CoreError::Validation("renewal event without original transaction id".into())
        })?;

        let Some(sub) = self.store.subscription_by_origin(origin).await? else {
            // Cannot be linked. Non-fatal: the provider keeps its money
            // trail and support can replay once the subscription exists.
            tracing::warn!(origin_txn = %origin, txn_id = %event.external_txn_id, "orphan renewal notice, no matching subscription");
            return Ok(ReconcileOutcome::Orphaned);
        };

        let plan = self.catalog.plan(&sub.plan_id).ok_or_else(|| {
            CoreError::Validation(format!("unknown plan: {}", sub.plan_id))
        })?;

        // Renewals are confirmed at notification time; the order is born
        // paid, there is no pending phase.
        let now = Utc::now();
        let order = Order {
            order_no: OrderNo::generate(now),
            user_id: sub.user_id,
            order_type: OrderType::Subscription,
            related_id: sub.plan_id,
            money: plan.price,
            payment_method: event.provider.clone(),
            status: OrderStatus::Paid,
            external_txn_id: Some(event.external_txn_id.clone()),
            paid_at: Some(event.purchased_at),
            refund: None,
            failure_reason: None,
            description: "subscription renewal".into(),
            created_at: now,
        };

        match self.ledger.record_paid_order(order).await? {
            Completion::Applied(order) => {
                self.apply_downstream(&order, event).await?;
                tracing::info!(order_no = %order.order_no, origin_txn = %origin, "subscription renewal reconciled");
                Ok(ReconcileOutcome::Renewed(order.order_no))
            }
            Completion::AlreadyPaid(existing) => {
                // Same convergence rule as purchases: a redelivery finishes
                // whatever the first delivery left undone.
                self.apply_downstream(&existing, event).await?;
                tracing::info!(txn_id = %event.external_txn_id, "duplicate renewal delivery");
                Ok(ReconcileOutcome::Duplicate(existing.order_no))
            }
            Completion::Terminal(status) => Err(CoreError::Conflict(format!(
                "renewal order landed in unexpected state {status}"
            ))),
        }
    }

    async fn reconcile_cancellation(
        &self,
        event: &PaymentEvent,
    ) -> Result<ReconcileOutcome, CoreError> {
        let origin = event.original_txn_id.as_deref().ok_or_else(|| {
            CoreError::Validation("cancellation event without original transaction id".into())
        })?;

        match self.subscriptions.cancel_by_origin(origin, Utc::now()).await? {
            Some(sub) => Ok(ReconcileOutcome::Cancelled(sub.user_id)),
            None => {
                tracing::warn!(origin_txn = %origin, "orphan cancellation notice, no matching subscription");
                Ok(ReconcileOutcome::Orphaned)
            }
        }
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }
}
