use {
    crate::config::PlatformConfig,
    crate::domain::catalog::Catalog,
    crate::domain::error::CoreError,
    crate::domain::income::{CreatorIncomeEntry, IncomeSource, WithdrawStatus},
    crate::domain::order::{Order, OrderStatus, OrderType},
    crate::store::LedgerStore,
    chrono::Utc,
    std::sync::Arc,
    uuid::Uuid,
};

/// Sole creator of income entries. One immutable entry per paid order;
/// repeat invocation is a no-op thanks to the (order, creator) uniqueness
/// guard in the store.
#[derive(Clone)]
pub struct RevenueSplitter {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn Catalog>,
    config: PlatformConfig,
}

impl RevenueSplitter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn Catalog>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Split a paid order into platform fee and creator net, and persist
    /// the entry. Returns `None` when the order has no beneficiary
    /// (platform subscription plans) or was already split.
    pub async fn split(&self, order: &Order) -> Result<Option<CreatorIncomeEntry>, CoreError> {
        if order.status != OrderStatus::Paid {
            return Err(CoreError::Validation(format!(
                "cannot split order {} in state {}",
                order.order_no, order.status
            )));
        }

        let (creator_id, source) = match order.order_type {
            OrderType::Content => match self.catalog.content(&order.related_id) {
                Some(listing) => (listing.owner_id, IncomeSource::ContentSale),
                None => {
                    // Listing vanished between purchase and reconcile.
                    // Permanent condition — retrying won't bring it back.
                    tracing::warn!(
                        order_no = %order.order_no,
                        related_id = %order.related_id,
                        "no listing for paid content order, skipping split"
                    );
                    return Ok(None);
                }
            },
            OrderType::Tip => (order.related_id, IncomeSource::Tip),
            OrderType::Subscription => {
                match self
                    .catalog
                    .plan(&order.related_id)
                    .and_then(|p| p.share_creator)
                {
                    Some(creator) => (creator, IncomeSource::SubscriptionShare),
                    // Platform plan: no creator share.
                    None => return Ok(None),
                }
            }
        };

        let total = order.money.amount();
        let platform_fee = total.share_bps(self.config.platform_fee_bps);
        let net = total - platform_fee;

        let paid_at = order.paid_at.unwrap_or_else(Utc::now);
        let available_at = paid_at + self.config.settlement_delay;
        let withdraw_status = if self.config.settlement_delay.is_zero() {
            WithdrawStatus::Withdrawable
        } else {
            WithdrawStatus::Pending
        };

        let entry = CreatorIncomeEntry {
            id: Uuid::now_v7(),
            creator_id,
            source_order_no: order.order_no.clone(),
            source,
            total,
            platform_fee,
            net,
            withdraw_status,
            available_at,
            batch_id: None,
            created_at: Utc::now(),
        };

        if self.store.insert_income_entry(entry.clone()).await? {
            tracing::info!(
                order_no = %order.order_no,
                creator_id = %creator_id,
                net = %net,
                "income entry created"
            );
            Ok(Some(entry))
        } else {
            tracing::debug!(order_no = %order.order_no, "order already split, skipping");
            Ok(None)
        }
    }
}
