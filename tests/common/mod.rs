#![allow(dead_code)]

use {
    chrono::{DateTime, Utc},
    creator_pay::{
        config::PlatformConfig,
        domain::{
            catalog::{Catalog, Listing, Plan, StaticCatalog},
            error::CoreError,
            event::{EventKind, PaymentEvent},
            income::CreatorIncomeEntry,
            money::{Currency, Money, MoneyAmount},
            order::{NewOrderRequest, Order, OrderNo, OrderStatus, OrderType, Refund},
            subscription::Subscription,
            withdrawal::WithdrawalBatch,
        },
        services::{
            ledger::OrderLedger, lifecycle::SubscriptionManager, reconcile::ReconciliationEngine,
            splitter::RevenueSplitter, withdrawal::WithdrawalProcessor,
        },
        store::{Completion, LedgerStore, StoreFuture, memory::MemoryStore},
    },
    std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    uuid::Uuid,
};

pub const PRODUCT_VIP: &str = "com.platform.vip.monthly";

/// Everything a test needs: the wired services over an in-memory store,
/// plus the fixture ids (one creator, one priced content item, a platform
/// plan and a creator-share plan).
pub struct TestPlatform {
    pub store: Arc<dyn LedgerStore>,
    pub engine: ReconciliationEngine,
    pub ledger: OrderLedger,
    pub subscriptions: SubscriptionManager,
    pub withdrawals: WithdrawalProcessor,
    pub creator: Uuid,
    pub content: Uuid,
    pub platform_plan: Uuid,
    pub creator_plan: Uuid,
}

/// 30% fee, 5.00 minimum withdrawal, instant settlement.
pub fn test_config() -> PlatformConfig {
    PlatformConfig {
        platform_fee_bps: 3000,
        min_withdrawal: MoneyAmount::new(500).unwrap(),
        settlement_delay: chrono::Duration::zero(),
    }
}

impl TestPlatform {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: PlatformConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn LedgerStore>, config: PlatformConfig) -> Self {
        let creator = Uuid::now_v7();
        let content = Uuid::now_v7();
        let platform_plan = Uuid::now_v7();
        let creator_plan = Uuid::now_v7();

        let catalog: Arc<dyn Catalog> = Arc::new(
            StaticCatalog::new()
                .with_listing(
                    content,
                    Listing {
                        owner_id: creator,
                        price: cny(1000),
                    },
                )
                .with_plan(Plan {
                    plan_id: platform_plan,
                    period_days: 30,
                    price: cny(1500),
                    share_creator: None,
                    product_id: None,
                })
                .with_plan(Plan {
                    plan_id: creator_plan,
                    period_days: 30,
                    price: cny(2000),
                    share_creator: Some(creator),
                    product_id: Some(PRODUCT_VIP.to_string()),
                }),
        );

        let ledger = OrderLedger::new(store.clone(), catalog.clone());
        let splitter = RevenueSplitter::new(store.clone(), catalog.clone(), config.clone());
        let subscriptions = SubscriptionManager::new(store.clone(), catalog.clone());
        let withdrawals = WithdrawalProcessor::new(store.clone(), config);
        let engine = ReconciliationEngine::new(
            store.clone(),
            catalog,
            ledger.clone(),
            splitter,
            subscriptions.clone(),
        );

        Self {
            store,
            engine,
            ledger,
            subscriptions,
            withdrawals,
            creator,
            content,
            platform_plan,
            creator_plan,
        }
    }

    pub async fn content_order(&self, user: Uuid) -> Order {
        self.ledger
            .create_order(NewOrderRequest {
                user_id: user,
                order_type: OrderType::Content,
                related_id: self.content,
                money: cny(1000),
                payment_method: "wallet".into(),
                description: "content purchase".into(),
            })
            .await
            .expect("content order")
    }

    pub async fn plan_order(&self, user: Uuid, plan_id: Uuid, amount: Money) -> Order {
        self.ledger
            .create_order(NewOrderRequest {
                user_id: user,
                order_type: OrderType::Subscription,
                related_id: plan_id,
                money: amount,
                payment_method: "wallet".into(),
                description: "subscription".into(),
            })
            .await
            .expect("subscription order")
    }

    pub async fn tip_order(&self, user: Uuid, amount: Money) -> Order {
        self.ledger
            .create_order(NewOrderRequest {
                user_id: user,
                order_type: OrderType::Tip,
                related_id: self.creator,
                money: amount,
                payment_method: "wallet".into(),
                description: "tip".into(),
            })
            .await
            .expect("tip order")
    }
}

pub fn cny(cents: i64) -> Money {
    Money::new(MoneyAmount::new(cents).unwrap(), Currency::Cny)
}

/// Wallet gateway purchase carrying the merchant order number out of band.
pub fn wallet_purchase(order_no: &OrderNo, txn: &str) -> PaymentEvent {
    PaymentEvent {
        provider: "wallet".into(),
        external_txn_id: txn.into(),
        original_txn_id: None,
        order_no: Some(order_no.clone()),
        user_id: None,
        money: Some(cny(1000)),
        product_id: None,
        purchased_at: Utc::now(),
        kind: EventKind::Purchase,
    }
}

/// In-app purchase: buyer and product, no merchant order reference.
pub fn iap_purchase(user: Uuid, txn: &str, original: Option<&str>) -> PaymentEvent {
    PaymentEvent {
        provider: "appstore".into(),
        external_txn_id: txn.into(),
        original_txn_id: original.map(str::to_string),
        order_no: None,
        user_id: Some(user),
        money: None,
        product_id: Some(PRODUCT_VIP.to_string()),
        purchased_at: Utc::now(),
        kind: EventKind::Purchase,
    }
}

pub fn renewal(txn: &str, original: &str) -> PaymentEvent {
    PaymentEvent {
        provider: "appstore".into(),
        external_txn_id: txn.into(),
        original_txn_id: Some(original.into()),
        order_no: None,
        user_id: None,
        money: None,
        product_id: None,
        purchased_at: Utc::now(),
        kind: EventKind::Renewal,
    }
}

/// Store whose first income entry insert fails with a transient error,
/// emulating the database dying between the paid transition and the split.
/// Everything else passes straight through to an in-memory store.
pub struct FailOnceIncomeStore {
    inner: MemoryStore,
    fail_next_income_insert: AtomicBool,
}

impl FailOnceIncomeStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_next_income_insert: AtomicBool::new(true),
        }
    }
}

impl LedgerStore for FailOnceIncomeStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        self.inner.insert_order(order)
    }

    fn insert_paid_order(&self, order: Order) -> StoreFuture<'_, Completion> {
        self.inner.insert_paid_order(order)
    }

    fn order(&self, order_no: &OrderNo) -> StoreFuture<'_, Option<Order>> {
        self.inner.order(order_no)
    }

    fn order_by_txn(&self, txn_id: &str) -> StoreFuture<'_, Option<Order>> {
        self.inner.order_by_txn(txn_id)
    }

    fn has_paid_content_order(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, bool> {
        self.inner.has_paid_content_order(user_id, related_id)
    }

    fn pending_order_for(&self, user_id: Uuid, related_id: Uuid) -> StoreFuture<'_, Option<Order>> {
        self.inner.pending_order_for(user_id, related_id)
    }

    fn complete_if_pending(
        &self,
        order_no: &OrderNo,
        txn_id: &str,
        paid_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Completion> {
        self.inner.complete_if_pending(order_no, txn_id, paid_at)
    }

    fn terminate_if_pending(
        &self,
        order_no: &OrderNo,
        to: OrderStatus,
        reason: &str,
    ) -> StoreFuture<'_, bool> {
        self.inner.terminate_if_pending(order_no, to, reason)
    }

    fn refund_if_paid(&self, order_no: &OrderNo, refund: Refund) -> StoreFuture<'_, Option<Order>> {
        self.inner.refund_if_paid(order_no, refund)
    }

    fn insert_income_entry(&self, entry: CreatorIncomeEntry) -> StoreFuture<'_, bool> {
        if self.fail_next_income_insert.swap(false, Ordering::SeqCst) {
            return Box::pin(async { Err(CoreError::Store(sqlx::Error::PoolTimedOut)) });
        }
        self.inner.insert_income_entry(entry)
    }

    fn release_matured_entries(
        &self,
        creator_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, u64> {
        self.inner.release_matured_entries(creator_id, now)
    }

    fn reserve_withdrawable(
        &self,
        creator_id: Uuid,
        batch_id: Uuid,
        min_total: MoneyAmount,
    ) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        self.inner.reserve_withdrawable(creator_id, batch_id, min_total)
    }

    fn income_entries(&self, creator_id: Uuid) -> StoreFuture<'_, Vec<CreatorIncomeEntry>> {
        self.inner.income_entries(creator_id)
    }

    fn insert_batch(&self, batch: WithdrawalBatch) -> StoreFuture<'_, ()> {
        self.inner.insert_batch(batch)
    }

    fn batch(&self, batch_id: Uuid) -> StoreFuture<'_, Option<WithdrawalBatch>> {
        self.inner.batch(batch_id)
    }

    fn settle_batch(
        &self,
        batch_id: Uuid,
        approved: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, WithdrawalBatch> {
        self.inner.settle_batch(batch_id, approved, reason, now)
    }

    fn subscription_for_user(&self, user_id: Uuid) -> StoreFuture<'_, Option<Subscription>> {
        self.inner.subscription_for_user(user_id)
    }

    fn subscription_by_origin(
        &self,
        original_txn_id: &str,
    ) -> StoreFuture<'_, Option<Subscription>> {
        self.inner.subscription_by_origin(original_txn_id)
    }

    fn put_subscription(&self, sub: Subscription) -> StoreFuture<'_, ()> {
        self.inner.put_subscription(sub)
    }

    fn put_subscription_if(
        &self,
        sub: Subscription,
        expected_last_order_no: Option<OrderNo>,
    ) -> StoreFuture<'_, bool> {
        self.inner.put_subscription_if(sub, expected_last_order_no)
    }
}

pub fn cancellation(original: &str) -> PaymentEvent {
    PaymentEvent {
        provider: "appstore".into(),
        external_txn_id: original.into(),
        original_txn_id: Some(original.into()),
        order_no: None,
        user_id: None,
        money: None,
        product_id: None,
        purchased_at: Utc::now(),
        kind: EventKind::Cancellation,
    }
}
