use {
    super::{Completion, LedgerStore, StoreFuture},
    crate::domain::error::CoreError,
    crate::domain::income::{CreatorIncomeEntry, WithdrawStatus},
    crate::domain::money::MoneyAmount,
    crate::domain::order::{Order, OrderNo, OrderStatus, OrderType, Refund, RefundStatus},
    crate::domain::subscription::Subscription,
    crate::domain::withdrawal::{BatchStatus, WithdrawalBatch},
    chrono::{DateTime, Utc},
    std::collections::HashMap,
    std::sync::Mutex,
    uuid::Uuid,
};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderNo, Order>,
    /// external_txn_id → order no. Uniqueness index for the idempotency key.
    txn_index: HashMap<String, OrderNo>,
    entries: HashMap<Uuid, CreatorIncomeEntry>,
    /// (source_order_no, creator_id) → entry id. One entry per pair.
    entry_index: HashMap<(OrderNo, Uuid), Uuid>,
    batches: HashMap<Uuid, WithdrawalBatch>,
    subscriptions: HashMap<Uuid, Subscription>,
}

/// In-process store. Every conditional operation runs under one mutex, so
/// it is atomic by construction — the reference semantics the Postgres
/// store must match.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            if inner.orders.contains_key(&order.order_no) {
                return Err(CoreError::Conflict(format!(
                    "order {} already exists",
                    order.order_no
                )));
            }
            if let Some(txn) = &order.external_txn_id {
                if inner.txn_index.contains_key(txn) {
                    return Err(CoreError::Conflict(format!(
                        "transaction {txn} already credited"
                    )));
                }
                inner.txn_index.insert(txn.clone(), order.order_no.clone());
            }
            inner.orders.insert(order.order_no.clone(), order);
            Ok(())
        })
    }

    fn insert_paid_order(&self, order: Order) -> StoreFuture<'_, Completion> {
        Box::pin(async move {
            let txn = order.external_txn_id.clone().ok_or_else(|| {
                CoreError::Validation("paid order requires an external transaction id".into())
            })?;
            let mut inner = self.inner.lock().expect("store lock poisoned");
            if let Some(no) = inner.txn_index.get(&txn) {
                let existing = inner.orders[no].clone();
                return Ok(Completion::AlreadyPaid(existing));
            }
            inner.txn_index.insert(txn, order.order_no.clone());
            inner.orders.insert(order.order_no.clone(), order.clone());
            Ok(Completion::Applied(order))
        })
    }

    fn order(&self, order_no: &OrderNo) -> StoreFuture<'_, Option<Order>> {
        let order_no = order_no.clone();
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner.orders.get(&order_no).cloned())
        })
    }

    fn order_by_txn(&self, txn_id: &str) -> StoreFuture<'_, Option<Order>> {
        let txn_id = txn_id.to_string();
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner
                .txn_index
                .get(&txn_id)
                .and_then(|no| inner.orders.get(no))
                .cloned())
        })
    }

    fn has_paid_content_order(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner.orders.values().any(|o| {
                o.user_id == user_id
                    && o.related_id == related_id
                    && o.order_type == OrderType::Content
                    && o.status == OrderStatus::Paid
            }))
        })
    }

    fn pending_order_for(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, Option<Order>> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner
                .orders
                .values()
                .filter(|o| {
                    o.user_id == user_id
                        && o.related_id == related_id
                        && o.status == OrderStatus::Pending
                })
                .min_by_key(|o| o.created_at)
                .cloned())
        })
    }

    fn complete_if_pending(
        &self,
        order_no: &OrderNo,
        txn_id: &str,
        paid_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Completion> {
        let order_no = order_no.clone();
        let txn_id = txn_id.to_string();
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");

            // The transaction id is the idempotency key: if it is already
            // credited anywhere, this delivery is a duplicate.
            if let Some(no) = inner.txn_index.get(&txn_id) {
                let existing = inner.orders[no].clone();
                return Ok(Completion::AlreadyPaid(existing));
            }

            let status = inner
                .orders
                .get(&order_no)
                .map(|o| o.status)
                .ok_or_else(|| CoreError::Validation(format!("unknown order: {order_no}")))?;

            match status {
                OrderStatus::Pending => {
                    let order = inner.orders.get_mut(&order_no).expect("checked above");
                    order.status = OrderStatus::Paid;
                    order.external_txn_id = Some(txn_id.clone());
                    order.paid_at = Some(paid_at);
                    let updated = order.clone();
                    inner.txn_index.insert(txn_id, order_no);
                    Ok(Completion::Applied(updated))
                }
                OrderStatus::Paid => Ok(Completion::AlreadyPaid(inner.orders[&order_no].clone())),
                terminal => Ok(Completion::Terminal(terminal)),
            }
        })
    }

    fn terminate_if_pending(
        &self,
        order_no: &OrderNo,
        to: OrderStatus,
        reason: &str,
    ) -> StoreFuture<'_, bool> {
        let order_no = order_no.clone();
        let reason = reason.to_string();
        Box::pin(async move {
            if !matches!(to, OrderStatus::Failed | OrderStatus::Cancelled) {
                return Err(CoreError::Validation(format!(
                    "terminate_if_pending cannot target {to}"
                )));
            }
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let order = inner.orders.get_mut(&order_no).ok_or_else(|| {
                CoreError::Validation(format!("unknown order: {order_no}"))
            })?;
            if order.status != OrderStatus::Pending {
                return Ok(false);
            }
            order.status = to;
            order.failure_reason = Some(reason);
            Ok(true)
        })
    }

    fn refund_if_paid(&self, order_no: &OrderNo, refund: Refund) -> StoreFuture<'_, Option<Order>> {
        let order_no = order_no.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let order = inner.orders.get_mut(&order_no).ok_or_else(|| {
                CoreError::Validation(format!("unknown order: {order_no}"))
            })?;
            if order.status != OrderStatus::Paid {
                return Ok(None);
            }
            let mut refund = refund;
            refund.status = RefundStatus::Processed;
            refund.processed_at = Some(Utc::now());
            order.status = OrderStatus::Refunded;
            order.refund = Some(refund);
            Ok(Some(order.clone()))
        })
    }

    fn insert_income_entry(&self, entry: CreatorIncomeEntry) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let key = (entry.source_order_no.clone(), entry.creator_id);
            if inner.entry_index.contains_key(&key) {
                return Ok(false);
            }
            inner.entry_index.insert(key, entry.id);
            inner.entries.insert(entry.id, entry);
            Ok(true)
        })
    }

    fn release_matured_entries(
        &self,
        creator_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let mut released = 0;
            for entry in inner.entries.values_mut() {
                if entry.creator_id == creator_id
                    && entry.withdraw_status == WithdrawStatus::Pending
                    && entry.available_at <= now
                {
                    entry.withdraw_status = WithdrawStatus::Withdrawable;
                    released += 1;
                }
            }
            Ok(released)
        })
    }

    fn reserve_withdrawable(
        &self,
        creator_id: Uuid,
        batch_id: Uuid,
        min_total: MoneyAmount,
    ) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");

            let candidate_ids: Vec<Uuid> = inner
                .entries
                .values()
                .filter(|e| {
                    e.creator_id == creator_id
                        && e.withdraw_status == WithdrawStatus::Withdrawable
                })
                .map(|e| e.id)
                .collect();

            let total = candidate_ids
                .iter()
                .map(|id| inner.entries[id].net)
                .try_fold(MoneyAmount::zero(), |acc, net| acc.checked_add(net))
                .ok_or_else(|| CoreError::Validation("withdrawable total overflow".into()))?;

            if candidate_ids.is_empty() {
                return Err(CoreError::Validation(
                    "no withdrawable income entries".into(),
                ));
            }
            if total < min_total {
                return Err(CoreError::Validation(format!(
                    "withdrawable total {total} below minimum {min_total}"
                )));
            }

            let mut reserved = Vec::with_capacity(candidate_ids.len());
            for id in candidate_ids {
                let entry = inner.entries.get_mut(&id).expect("collected above");
                entry.withdraw_status = WithdrawStatus::Processing;
                entry.batch_id = Some(batch_id);
                reserved.push(entry.clone());
            }
            reserved.sort_by_key(|e| e.created_at);
            Ok(reserved)
        })
    }

    fn income_entries(&self, creator_id: Uuid) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            let mut entries: Vec<_> = inner
                .entries
                .values()
                .filter(|e| e.creator_id == creator_id)
                .cloned()
                .collect();
            entries.sort_by_key(|e| e.created_at);
            Ok(entries)
        })
    }

    fn insert_batch(&self, batch: WithdrawalBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            if inner.batches.contains_key(&batch.batch_id) {
                return Err(CoreError::Conflict(format!(
                    "batch {} already exists",
                    batch.batch_id
                )));
            }
            inner.batches.insert(batch.batch_id, batch);
            Ok(())
        })
    }

    fn batch(&self, batch_id: Uuid) -> StoreFuture<'_, Option<WithdrawalBatch>> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner.batches.get(&batch_id).cloned())
        })
    }

    fn settle_batch(
        &self,
        batch_id: Uuid,
        approved: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, WithdrawalBatch> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let batch = inner.batches.get(&batch_id).ok_or_else(|| {
                CoreError::Validation(format!("unknown batch: {batch_id}"))
            })?;
            if batch.status.is_settled() {
                return Err(CoreError::Conflict(format!(
                    "batch {batch_id} already settled as {}",
                    batch.status
                )));
            }

            let entry_ids = batch.entry_ids.clone();
            for id in &entry_ids {
                if let Some(entry) = inner.entries.get_mut(id) {
                    if approved {
                        entry.withdraw_status = WithdrawStatus::Withdrawn;
                    } else {
                        // Rejection releases the funds, it does not burn them.
                        entry.withdraw_status = WithdrawStatus::Withdrawable;
                        entry.batch_id = None;
                    }
                }
            }

            let batch = inner.batches.get_mut(&batch_id).expect("checked above");
            batch.status = if approved {
                BatchStatus::Completed
            } else {
                BatchStatus::Failed
            };
            batch.settled_at = Some(now);
            batch.failure_reason = if approved { None } else { reason };
            Ok(batch.clone())
        })
    }

    fn subscription_for_user(&self, user_id: Uuid) -> StoreFuture<'_, Option<Subscription>> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner.subscriptions.get(&user_id).cloned())
        })
    }

    fn subscription_by_origin(
        &self,
        original_txn_id: &str,
    ) -> StoreFuture<'_, Option<Subscription>> {
        let original_txn_id = original_txn_id.to_string();
        Box::pin(async move {
            let inner = self.inner.lock().expect("store lock poisoned");
            Ok(inner
                .subscriptions
                .values()
                .find(|s| s.original_txn_id.as_deref() == Some(original_txn_id.as_str()))
                .cloned())
        })
    }

    fn put_subscription(&self, sub: Subscription) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            inner.subscriptions.insert(sub.user_id, sub);
            Ok(())
        })
    }

    fn put_subscription_if(
        &self,
        sub: Subscription,
        expected_last_order_no: Option<OrderNo>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let matches = match (inner.subscriptions.get(&sub.user_id), &expected_last_order_no) {
                (None, None) => true,
                (Some(current), Some(expected)) => current.last_order_no == *expected,
                _ => false,
            };
            if matches {
                inner.subscriptions.insert(sub.user_id, sub);
            }
            Ok(matches)
        })
    }
}
