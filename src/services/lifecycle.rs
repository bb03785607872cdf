use {
    crate::domain::catalog::Catalog,
    crate::domain::error::CoreError,
    crate::domain::order::Order,
    crate::domain::subscription::{Subscription, SubscriptionStatus},
    crate::store::LedgerStore,
    chrono::{DateTime, Duration, Utc},
    std::sync::Arc,
    uuid::Uuid,
};

/// Owns subscription rows: activation on first paid order, extension on
/// renewals, cancellation on user or provider request.
#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn Catalog>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    /// First paid order creates the subscription; every later one extends
    /// it by a plan period from `max(now, end_date)`, so renewing early
    /// never loses remaining entitlement time.
    ///
    /// `last_order_no` doubles as the row version: each order extends the
    /// row at most once (duplicate deliveries and retries are no-ops), and
    /// a guarded write plus re-read makes two concurrent renewals with
    /// distinct orders land one extension each instead of overwriting.
    pub async fn activate_or_renew(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        order: &Order,
        original_txn_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Subscription, CoreError> {
        let plan = self
            .catalog
            .plan(&plan_id)
            .ok_or_else(|| CoreError::Validation(format!("unknown plan: {plan_id}")))?;
        let period = Duration::days(plan.period_days);

        loop {
            match self.store.subscription_for_user(user_id).await? {
                None => {
                    let sub = Subscription {
                        user_id,
                        plan_id,
                        status: SubscriptionStatus::Active,
                        start_date: now,
                        end_date: now + period,
                        auto_renew: true,
                        last_order_no: order.order_no.clone(),
                        original_txn_id: original_txn_id.clone(),
                    };
                    if self.store.put_subscription_if(sub.clone(), None).await? {
                        tracing::info!(user_id = %user_id, plan_id = %plan_id, end = %sub.end_date, "subscription activated");
                        return Ok(sub);
                    }
                }
                Some(existing) => {
                    if existing.last_order_no == order.order_no {
                        // This order already extended the row.
                        return Ok(existing);
                    }
                    let base = existing.end_date.max(now);
                    let sub = Subscription {
                        user_id,
                        plan_id,
                        status: SubscriptionStatus::Active,
                        start_date: existing.start_date,
                        end_date: base + period,
                        auto_renew: existing.auto_renew,
                        last_order_no: order.order_no.clone(),
                        original_txn_id: original_txn_id.clone().or(existing.original_txn_id),
                    };
                    if self
                        .store
                        .put_subscription_if(sub.clone(), Some(existing.last_order_no))
                        .await?
                    {
                        tracing::info!(user_id = %user_id, end = %sub.end_date, "subscription renewed");
                        return Ok(sub);
                    }
                }
            }
            // Another writer moved the row between read and write; re-read.
        }
    }

    /// Cancel auto-renew. The entitlement stays valid until `end_date`
    /// unless `effective_immediately`. Already-cancelled is idempotent.
    pub async fn cancel(
        &self,
        user_id: Uuid,
        effective_immediately: bool,
        now: DateTime<Utc>,
    ) -> Result<Subscription, CoreError> {
        let mut sub = self
            .store
            .subscription_for_user(user_id)
            .await?
            .ok_or_else(|| {
                CoreError::Validation(format!("no subscription for user {user_id}"))
            })?;

        if sub.status == SubscriptionStatus::Cancelled && !effective_immediately {
            return Ok(sub);
        }

        sub.status = SubscriptionStatus::Cancelled;
        sub.auto_renew = false;
        if effective_immediately {
            sub.end_date = now;
        }
        self.store.put_subscription(sub.clone()).await?;
        tracing::info!(user_id = %user_id, immediate = effective_immediately, "subscription cancelled");
        Ok(sub)
    }

    /// Provider-driven cancellation, addressed by the original transaction
    /// id. `None` means no subscription matches (orphan notice).
    pub async fn cancel_by_origin(
        &self,
        original_txn_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, CoreError> {
        match self.store.subscription_by_origin(original_txn_id).await? {
            Some(sub) => Ok(Some(self.cancel(sub.user_id, false, now).await?)),
            None => Ok(None),
        }
    }

    pub async fn subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, CoreError> {
        self.store.subscription_for_user(user_id).await
    }
}
