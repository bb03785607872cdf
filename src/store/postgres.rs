use {
    super::{Completion, LedgerStore, StoreFuture},
    crate::domain::error::CoreError,
    crate::domain::income::{CreatorIncomeEntry, IncomeSource, WithdrawStatus},
    crate::domain::money::{Currency, Money, MoneyAmount},
    crate::domain::order::{Order, OrderNo, OrderStatus, OrderType, Refund},
    crate::domain::subscription::{Subscription, SubscriptionStatus},
    crate::domain::withdrawal::{BatchStatus, WithdrawalBatch},
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Row, postgres::PgRow},
    uuid::Uuid,
};

/// Postgres-backed ledger. Conditional transitions are single
/// `UPDATE ... WHERE status = ...` statements; same-transaction-id
/// deliveries are serialized with an advisory lock, the pattern that
/// survives concurrent duplicate webhooks without gap locks.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, CoreError> {
    let refund: Option<serde_json::Value> = row.try_get("refund")?;
    let refund: Option<Refund> = refund.map(serde_json::from_value).transpose()?;
    let status: String = row.try_get("status")?;
    let order_type: String = row.try_get("order_type")?;
    let currency: String = row.try_get("currency")?;
    Ok(Order {
        order_no: OrderNo::parse(row.try_get::<String, _>("order_no")?)?,
        user_id: row.try_get("user_id")?,
        order_type: OrderType::try_from(order_type.as_str())?,
        related_id: row.try_get("related_id")?,
        money: Money::new(
            MoneyAmount::new(row.try_get("amount")?)?,
            Currency::try_from(currency.as_str())?,
        ),
        payment_method: row.try_get("payment_method")?,
        status: OrderStatus::try_from(status.as_str())?,
        external_txn_id: row.try_get("external_txn_id")?,
        paid_at: row.try_get("paid_at")?,
        refund,
        failure_reason: row.try_get("failure_reason")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<CreatorIncomeEntry, CoreError> {
    let source: String = row.try_get("source")?;
    let withdraw_status: String = row.try_get("withdraw_status")?;
    Ok(CreatorIncomeEntry {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        source_order_no: OrderNo::parse(row.try_get::<String, _>("source_order_no")?)?,
        source: IncomeSource::try_from(source.as_str())?,
        total: MoneyAmount::new(row.try_get("total")?)?,
        platform_fee: MoneyAmount::new(row.try_get("platform_fee")?)?,
        net: MoneyAmount::new(row.try_get("net")?)?,
        withdraw_status: WithdrawStatus::try_from(withdraw_status.as_str())?,
        available_at: row.try_get("available_at")?,
        batch_id: row.try_get("batch_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, CoreError> {
    let status: String = row.try_get("status")?;
    Ok(Subscription {
        user_id: row.try_get("user_id")?,
        plan_id: row.try_get("plan_id")?,
        status: SubscriptionStatus::try_from(status.as_str())?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        auto_renew: row.try_get("auto_renew")?,
        last_order_no: OrderNo::parse(row.try_get::<String, _>("last_order_no")?)?,
        original_txn_id: row.try_get("original_txn_id")?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<WithdrawalBatch, CoreError> {
    let status: String = row.try_get("status")?;
    Ok(WithdrawalBatch {
        batch_id: row.try_get("batch_id")?,
        creator_id: row.try_get("creator_id")?,
        entry_ids: row.try_get("entry_ids")?,
        method: row.try_get("method")?,
        account: row.try_get("account")?,
        total: MoneyAmount::new(row.try_get("total")?)?,
        status: BatchStatus::try_from(status.as_str())?,
        requested_at: row.try_get("requested_at")?,
        settled_at: row.try_get("settled_at")?,
        failure_reason: row.try_get("failure_reason")?,
    })
}

const ORDER_COLS: &str = "order_no, user_id, order_type, related_id, amount, currency, \
     payment_method, status, external_txn_id, paid_at, refund, failure_reason, \
     description, created_at";

impl LedgerStore for PgStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO orders \
                 (order_no, user_id, order_type, related_id, amount, currency, \
                  payment_method, status, external_txn_id, paid_at, description, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (order_no) DO NOTHING",
            )
            .bind(order.order_no.as_str())
            .bind(order.user_id)
            .bind(order.order_type.as_str())
            .bind(order.related_id)
            .bind(order.money.amount().cents())
            .bind(order.money.currency().as_str())
            .bind(&order.payment_method)
            .bind(order.status.as_str())
            .bind(&order.external_txn_id)
            .bind(order.paid_at)
            .bind(&order.description)
            .bind(order.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::Conflict(format!(
                    "order {} already exists",
                    order.order_no
                )));
            }
            Ok(())
        })
    }

    fn insert_paid_order(&self, order: Order) -> StoreFuture<'_, Completion> {
        Box::pin(async move {
            let txn = order.external_txn_id.clone().ok_or_else(|| {
                CoreError::Validation("paid order requires an external transaction id".into())
            })?;

            let mut tx = self.pool.begin().await?;

            // Serialize all processing for this transaction id.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&txn)
                .execute(&mut *tx)
                .await?;

            let existing = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE external_txn_id = $1"
            ))
            .bind(&txn)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = existing {
                tx.commit().await?;
                return Ok(Completion::AlreadyPaid(order_from_row(&row)?));
            }

            sqlx::query(
                "INSERT INTO orders \
                 (order_no, user_id, order_type, related_id, amount, currency, \
                  payment_method, status, external_txn_id, paid_at, description, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 'paid', $8, $9, $10, $11)",
            )
            .bind(order.order_no.as_str())
            .bind(order.user_id)
            .bind(order.order_type.as_str())
            .bind(order.related_id)
            .bind(order.money.amount().cents())
            .bind(order.money.currency().as_str())
            .bind(&order.payment_method)
            .bind(&txn)
            .bind(order.paid_at)
            .bind(&order.description)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Completion::Applied(order))
        })
    }

    fn order(&self, order_no: &OrderNo) -> StoreFuture<'_, Option<Order>> {
        let order_no = order_no.clone();
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE order_no = $1"
            ))
            .bind(order_no.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(order_from_row).transpose()
        })
    }

    fn order_by_txn(&self, txn_id: &str) -> StoreFuture<'_, Option<Order>> {
        let txn_id = txn_id.to_string();
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE external_txn_id = $1"
            ))
            .bind(&txn_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(order_from_row).transpose()
        })
    }

    fn has_paid_content_order(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM orders \
                 WHERE user_id = $1 AND related_id = $2 \
                   AND order_type = 'content' AND status = 'paid')",
            )
            .bind(user_id)
            .bind(related_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
    }

    fn pending_order_for(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, Option<Order>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders \
                 WHERE user_id = $1 AND related_id = $2 AND status = 'pending' \
                 ORDER BY created_at LIMIT 1"
            ))
            .bind(user_id)
            .bind(related_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(order_from_row).transpose()
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
            let mut tx = self.pool.begin().await?;

            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&txn_id)
                .execute(&mut *tx)
                .await?;

            // Idempotency: if this transaction id is credited anywhere,
            // the delivery is a duplicate.
            let credited = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE external_txn_id = $1"
            ))
            .bind(&txn_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = credited {
                tx.commit().await?;
                return Ok(Completion::AlreadyPaid(order_from_row(&row)?));
            }

            let updated = sqlx::query(&format!(
                "UPDATE orders \
                 SET status = 'paid', external_txn_id = $2, paid_at = $3, updated_at = now() \
                 WHERE order_no = $1 AND status = 'pending' \
                 RETURNING {ORDER_COLS}"
            ))
            .bind(order_no.as_str())
            .bind(&txn_id)
            .bind(paid_at)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = updated {
                let order = order_from_row(&row)?;
                tx.commit().await?;
                return Ok(Completion::Applied(order));
            }

            // Lost the race or the order sits in a terminal state.
            let row = sqlx::query(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE order_no = $1"
            ))
            .bind(order_no.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("unknown order: {order_no}")))?;

            let order = order_from_row(&row)?;
            tx.commit().await?;
            match order.status {
                OrderStatus::Paid => Ok(Completion::AlreadyPaid(order)),
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
            let result = sqlx::query(
                "UPDATE orders \
                 SET status = $2, failure_reason = $3, updated_at = now() \
                 WHERE order_no = $1 AND status = 'pending'",
            )
            .bind(order_no.as_str())
            .bind(to.as_str())
            .bind(&reason)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn refund_if_paid(&self, order_no: &OrderNo, refund: Refund) -> StoreFuture<'_, Option<Order>> {
        let order_no = order_no.clone();
        Box::pin(async move {
            let mut refund = refund;
            refund.status = crate::domain::order::RefundStatus::Processed;
            refund.processed_at = Some(Utc::now());
            let refund_json = serde_json::to_value(&refund)?;

            let row = sqlx::query(&format!(
                "UPDATE orders \
                 SET status = 'refunded', refund = $2, updated_at = now() \
                 WHERE order_no = $1 AND status = 'paid' \
                 RETURNING {ORDER_COLS}"
            ))
            .bind(order_no.as_str())
            .bind(refund_json)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(order_from_row).transpose()
        })
    }

    fn insert_income_entry(&self, entry: CreatorIncomeEntry) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO income_entries \
                 (id, creator_id, source_order_no, source, total, platform_fee, net, \
                  withdraw_status, available_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (source_order_no, creator_id) DO NOTHING",
            )
            .bind(entry.id)
            .bind(entry.creator_id)
            .bind(entry.source_order_no.as_str())
            .bind(entry.source.as_str())
            .bind(entry.total.cents())
            .bind(entry.platform_fee.cents())
            .bind(entry.net.cents())
            .bind(entry.withdraw_status.as_str())
            .bind(entry.available_at)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn release_matured_entries(
        &self,
        creator_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE income_entries \
                 SET withdraw_status = 'withdrawable' \
                 WHERE creator_id = $1 AND withdraw_status = 'pending' AND available_at <= $2",
            )
            .bind(creator_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
    }

    fn reserve_withdrawable(
        &self,
        creator_id: Uuid,
        batch_id: Uuid,
        min_total: MoneyAmount,
    ) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            // One conditional flip per row; a concurrent reservation sees
            // zero remaining 'withdrawable' rows for this creator.
            let rows = sqlx::query(
                "UPDATE income_entries \
                 SET withdraw_status = 'processing', batch_id = $2 \
                 WHERE creator_id = $1 AND withdraw_status = 'withdrawable' \
                 RETURNING id, creator_id, source_order_no, source, total, platform_fee, \
                           net, withdraw_status, available_at, batch_id, created_at",
            )
            .bind(creator_id)
            .bind(batch_id)
            .fetch_all(&mut *tx)
            .await?;

            let entries = rows
                .iter()
                .map(entry_from_row)
                .collect::<Result<Vec<_>, _>>()?;

            if entries.is_empty() {
                tx.rollback().await?;
                return Err(CoreError::Validation(
                    "no withdrawable income entries".into(),
                ));
            }

            let total = entries
                .iter()
                .try_fold(MoneyAmount::zero(), |acc, e| acc.checked_add(e.net))
                .ok_or_else(|| CoreError::Validation("withdrawable total overflow".into()))?;

            if total < min_total {
                // Nothing reserved: the claim rolls back wholesale.
                tx.rollback().await?;
                return Err(CoreError::Validation(format!(
                    "withdrawable total {total} below minimum {min_total}"
                )));
            }

            tx.commit().await?;
            let mut entries = entries;
            entries.sort_by_key(|e| e.created_at);
            Ok(entries)
        })
    }

    fn income_entries(&self, creator_id: Uuid) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, creator_id, source_order_no, source, total, platform_fee, \
                        net, withdraw_status, available_at, batch_id, created_at \
                 FROM income_entries WHERE creator_id = $1 ORDER BY created_at",
            )
            .bind(creator_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(entry_from_row).collect()
        })
    }

    fn insert_batch(&self, batch: WithdrawalBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO withdrawal_batches \
                 (batch_id, creator_id, entry_ids, method, account, total, status, requested_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(batch.batch_id)
            .bind(batch.creator_id)
            .bind(&batch.entry_ids)
            .bind(&batch.method)
            .bind(&batch.account)
            .bind(batch.total.cents())
            .bind(batch.status.as_str())
            .bind(batch.requested_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn batch(&self, batch_id: Uuid) -> StoreFuture<'_, Option<WithdrawalBatch>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT batch_id, creator_id, entry_ids, method, account, total, status, \
                        requested_at, settled_at, failure_reason \
                 FROM withdrawal_batches WHERE batch_id = $1",
            )
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(batch_from_row).transpose()
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
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(
                "SELECT batch_id, creator_id, entry_ids, method, account, total, status, \
                        requested_at, settled_at, failure_reason \
                 FROM withdrawal_batches WHERE batch_id = $1 FOR UPDATE",
            )
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("unknown batch: {batch_id}")))?;

            let batch = batch_from_row(&row)?;
            if batch.status.is_settled() {
                return Err(CoreError::Conflict(format!(
                    "batch {batch_id} already settled as {}",
                    batch.status
                )));
            }

            if approved {
                sqlx::query(
                    "UPDATE income_entries SET withdraw_status = 'withdrawn' \
                     WHERE batch_id = $1 AND withdraw_status = 'processing'",
                )
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;
            } else {
                // Rejection releases the funds, it does not burn them.
                sqlx::query(
                    "UPDATE income_entries \
                     SET withdraw_status = 'withdrawable', batch_id = NULL \
                     WHERE batch_id = $1 AND withdraw_status = 'processing'",
                )
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;
            }

            let row = sqlx::query(
                "UPDATE withdrawal_batches \
                 SET status = $2, settled_at = $3, failure_reason = $4 \
                 WHERE batch_id = $1 \
                 RETURNING batch_id, creator_id, entry_ids, method, account, total, status, \
                           requested_at, settled_at, failure_reason",
            )
            .bind(batch_id)
            .bind(if approved { "completed" } else { "failed" })
            .bind(now)
            .bind(if approved { None } else { reason })
            .fetch_one(&mut *tx)
            .await?;

            let batch = batch_from_row(&row)?;
            tx.commit().await?;
            Ok(batch)
        })
    }

    fn subscription_for_user(&self, user_id: Uuid) -> StoreFuture<'_, Option<Subscription>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT user_id, plan_id, status, start_date, end_date, auto_renew, \
                        last_order_no, original_txn_id \
                 FROM subscriptions WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(subscription_from_row).transpose()
        })
    }

    fn subscription_by_origin(
        &self,
        original_txn_id: &str,
    ) -> StoreFuture<'_, Option<Subscription>> {
        let original_txn_id = original_txn_id.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT user_id, plan_id, status, start_date, end_date, auto_renew, \
                        last_order_no, original_txn_id \
                 FROM subscriptions WHERE original_txn_id = $1",
            )
            .bind(&original_txn_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(subscription_from_row).transpose()
        })
    }

    fn put_subscription(&self, sub: Subscription) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO subscriptions \
                 (user_id, plan_id, status, start_date, end_date, auto_renew, \
                  last_order_no, original_txn_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                   plan_id = EXCLUDED.plan_id, status = EXCLUDED.status, \
                   start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date, \
                   auto_renew = EXCLUDED.auto_renew, \
                   last_order_no = EXCLUDED.last_order_no, \
                   original_txn_id = EXCLUDED.original_txn_id, \
                   updated_at = now()",
            )
            .bind(sub.user_id)
            .bind(sub.plan_id)
            .bind(sub.status.as_str())
            .bind(sub.start_date)
            .bind(sub.end_date)
            .bind(sub.auto_renew)
            .bind(sub.last_order_no.as_str())
            .bind(&sub.original_txn_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn put_subscription_if(
        &self,
        sub: Subscription,
        expected_last_order_no: Option<OrderNo>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = match expected_last_order_no {
                None => {
                    sqlx::query(
                        "INSERT INTO subscriptions \
                         (user_id, plan_id, status, start_date, end_date, auto_renew, \
                          last_order_no, original_txn_id) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                         ON CONFLICT (user_id) DO NOTHING",
                    )
                    .bind(sub.user_id)
                    .bind(sub.plan_id)
                    .bind(sub.status.as_str())
                    .bind(sub.start_date)
                    .bind(sub.end_date)
                    .bind(sub.auto_renew)
                    .bind(sub.last_order_no.as_str())
                    .bind(&sub.original_txn_id)
                    .execute(&self.pool)
                    .await?
                }
                Some(expected) => {
                    sqlx::query(
                        "UPDATE subscriptions SET \
                           plan_id = $2, status = $3, start_date = $4, end_date = $5, \
                           auto_renew = $6, last_order_no = $7, original_txn_id = $8, \
                           updated_at = now() \
                         WHERE user_id = $1 AND last_order_no = $9",
                    )
                    .bind(sub.user_id)
                    .bind(sub.plan_id)
                    .bind(sub.status.as_str())
                    .bind(sub.start_date)
                    .bind(sub.end_date)
                    .bind(sub.auto_renew)
                    .bind(sub.last_order_no.as_str())
                    .bind(&sub.original_txn_id)
                    .bind(expected.as_str())
                    .execute(&self.pool)
                    .await?
                }
            };
            Ok(result.rows_affected() == 1)
        })
    }
}
