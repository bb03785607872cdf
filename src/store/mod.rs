pub mod memory;
pub mod postgres;

use {
    crate::domain::error::CoreError,
    crate::domain::income::CreatorIncomeEntry,
    crate::domain::order::{Order, OrderNo, OrderStatus, Refund},
    crate::domain::subscription::Subscription,
    crate::domain::withdrawal::WithdrawalBatch,
    chrono::{DateTime, Utc},
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// Outcome of the conditional "mark paid" update.
#[derive(Debug, Clone)]
pub enum Completion {
    /// This call won the transition; downstream effects should run.
    Applied(Order),
    /// The transaction was already credited — duplicate delivery, or a
    /// losing concurrent attempt. Not an error; no side effects.
    AlreadyPaid(Order),
    /// The order sits in a terminal state the payment cannot apply to.
    Terminal(OrderStatus),
}

/// Persistence seam for the payment core. Every method that mutates shared
/// state is a single atomic conditional update — callers rely on that for
/// exactly-once semantics under concurrent duplicate deliveries.
pub trait LedgerStore: Send + Sync {
    // ── orders ─────────────────────────────────────────────────────────

    /// Insert a fresh `pending` order. Conflict on duplicate order no.
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()>;

    /// Insert an order already marked paid (synthesized renewals and
    /// restored purchases). Keyed on the external transaction id: if the
    /// id is already credited, returns the existing order instead.
    fn insert_paid_order(&self, order: Order) -> StoreFuture<'_, Completion>;

    fn order(&self, order_no: &OrderNo) -> StoreFuture<'_, Option<Order>>;

    fn order_by_txn(&self, txn_id: &str) -> StoreFuture<'_, Option<Order>>;

    /// Duplicate-purchase guard: does a paid order for this content by
    /// this user already exist?
    fn has_paid_content_order(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, bool>;

    /// Oldest pending order for `(user_id, related_id)` — used to match
    /// in-app purchases that carry no merchant order reference.
    fn pending_order_for(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, Option<Order>>;

    /// Compare-and-swap `pending → paid`, stamping the transaction id and
    /// paid timestamp in the same update.
    fn complete_if_pending(
        &self,
        order_no: &OrderNo,
        txn_id: &str,
        paid_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Completion>;

    /// `pending → failed/cancelled`. Returns false (not an error) when the
    /// order already left `pending`.
    fn terminate_if_pending(
        &self,
        order_no: &OrderNo,
        to: OrderStatus,
        reason: &str,
    ) -> StoreFuture<'_, bool>;

    /// `paid → refunded`, attaching the refund sub-record. `None` when the
    /// order is not currently paid.
    fn refund_if_paid(&self, order_no: &OrderNo, refund: Refund) -> StoreFuture<'_, Option<Order>>;

    // ── income entries ─────────────────────────────────────────────────

    /// Insert-if-absent on `(source_order_no, creator_id)`. Returns false
    /// when the entry already exists (repeat split — no-op).
    fn insert_income_entry(&self, entry: CreatorIncomeEntry) -> StoreFuture<'_, bool>;

    /// Flip matured `pending` entries to `withdrawable`. Returns how many.
    fn release_matured_entries(&self, creator_id: Uuid, now: DateTime<Utc>)
    -> StoreFuture<'_, u64>;

    /// Atomically claim every `withdrawable` entry of the creator under
    /// `batch_id`, flipping each to `processing`. If the net sum falls
    /// below `min_total` nothing is reserved and a Validation error comes
    /// back. Two concurrent reservations never claim the same entry.
    fn reserve_withdrawable(
        &self,
        creator_id: Uuid,
        batch_id: Uuid,
        min_total: crate::domain::money::MoneyAmount,
    ) -> StoreFuture<'_, Vec<CreatorIncomeEntry>>;

    fn income_entries(&self, creator_id: Uuid) -> StoreFuture<'_, Vec<CreatorIncomeEntry>>;

    // ── withdrawal batches ─────────────────────────────────────────────

    fn insert_batch(&self, batch: WithdrawalBatch) -> StoreFuture<'_, ()>;

    fn batch(&self, batch_id: Uuid) -> StoreFuture<'_, Option<WithdrawalBatch>>;

    /// Settle a `processing` batch: approved flips member entries to
    /// `withdrawn`, rejected releases them back to `withdrawable`.
    /// Unknown batch is a Validation error; settling twice a Conflict.
    fn settle_batch(
        &self,
        batch_id: Uuid,
        approved: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, WithdrawalBatch>;

    // ── subscriptions ──────────────────────────────────────────────────

    fn subscription_for_user(&self, user_id: Uuid) -> StoreFuture<'_, Option<Subscription>>;

    fn subscription_by_origin(&self, original_txn_id: &str)
    -> StoreFuture<'_, Option<Subscription>>;

    /// Upsert keyed on `user_id` — the store enforces the one-row-per-user
    /// invariant.
    fn put_subscription(&self, sub: Subscription) -> StoreFuture<'_, ()>;

    /// Guarded write for renewals, treating `last_order_no` as the row
    /// version: inserts only when no row exists (`expected` is None), or
    /// replaces only while `last_order_no` still equals `expected`.
    /// Returns false when the row moved — the caller re-reads and retries,
    /// so two concurrent extensions can never overwrite each other.
    fn put_subscription_if(
        &self,
        sub: Subscription,
        expected_last_order_no: Option<OrderNo>,
    ) -> StoreFuture<'_, bool>;
}
