mod common;

use {
    chrono::{Duration, Utc},
    common::{
        FailOnceIncomeStore, TestPlatform, cancellation, cny, iap_purchase, renewal, test_config,
        wallet_purchase,
    },
    creator_pay::domain::{
        error::CoreError,
        event::ReconcileOutcome,
        income::{IncomeSource, WithdrawStatus},
        money::MoneyAmount,
        order::OrderStatus,
        subscription::SubscriptionStatus,
    },
    std::sync::Arc,
    uuid::Uuid,
};

fn cents(v: i64) -> MoneyAmount {
    MoneyAmount::new(v).unwrap()
}

// ── purchases ───────────────────────────────────────────────────────────

#[tokio::test]
async fn content_purchase_splits_once_and_absorbs_redelivery() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let order = platform.content_order(buyer).await;
    let event = wallet_purchase(&order.order_no, "wallet-txn-1");

    let outcome = platform.engine.reconcile(&event).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed(order.order_no.clone()));

    let paid = platform.ledger.order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.external_txn_id.as_deref(), Some("wallet-txn-1"));

    // 10.00 at a 30% fee: creator keeps 7.00.
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.source, IncomeSource::ContentSale);
    assert_eq!(entry.total, cents(1000));
    assert_eq!(entry.platform_fee, cents(300));
    assert_eq!(entry.net, cents(700));
    assert_eq!(entry.withdraw_status, WithdrawStatus::Withdrawable);
    assert_eq!(entry.source_order_no, order.order_no);

    // Same notification again: no second split, no state change.
    let outcome = platform.engine.reconcile(&event).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate(order.order_no));
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn subscription_purchase_activates_and_shares_revenue() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let order = platform
        .plan_order(buyer, platform.creator_plan, cny(2000))
        .await;

    let before = Utc::now();
    let outcome = platform
        .engine
        .reconcile(&wallet_purchase(&order.order_no, "wallet-sub-1"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed(order.order_no.clone()));

    let sub = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.plan_id, platform.creator_plan);
    assert_eq!(sub.last_order_no, order.order_no);
    assert!(sub.end_date >= before + Duration::days(30));
    assert!(sub.is_active(Utc::now()));

    // 20.00 at 30%: the plan's creator keeps 14.00.
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, IncomeSource::SubscriptionShare);
    assert_eq!(entries[0].net, cents(1400));
}

#[tokio::test]
async fn platform_plan_purchase_creates_no_income_entry() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let order = platform
        .plan_order(buyer, platform.platform_plan, cny(1500))
        .await;

    platform
        .engine
        .reconcile(&wallet_purchase(&order.order_no, "wallet-plat-1"))
        .await
        .unwrap();

    assert!(platform.subscriptions.subscription(buyer).await.unwrap().is_some());
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn tip_credits_the_tipped_creator() {
    let platform = TestPlatform::new();
    let order = platform.tip_order(Uuid::now_v7(), cny(500)).await;

    platform
        .engine
        .reconcile(&wallet_purchase(&order.order_no, "wallet-tip-1"))
        .await
        .unwrap();

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, IncomeSource::Tip);
    assert_eq!(entries[0].total, cents(500));
    assert_eq!(entries[0].net, cents(350));
}

#[tokio::test]
async fn redelivery_recovers_a_split_lost_to_a_store_failure() {
    let platform = TestPlatform::with_store(Arc::new(FailOnceIncomeStore::new()), test_config());
    let order = platform.content_order(Uuid::now_v7()).await;
    let event = wallet_purchase(&order.order_no, "wallet-flaky-1");

    // First delivery marks the order paid, then the store dies before the
    // split lands.
    let err = platform.engine.reconcile(&event).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    let paid = platform.ledger.order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(platform.withdrawals.income_entries(platform.creator).await.unwrap().is_empty());

    // The provider redelivers: the paid transition is now a duplicate, but
    // the missing income entry must still land.
    let outcome = platform.engine.reconcile(&event).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate(order.order_no.clone()));
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].net, cents(700));

    // Further redeliveries stay no-ops.
    platform.engine.reconcile(&event).await.unwrap();
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn redelivery_recovers_an_activation_lost_to_a_store_failure() {
    let platform = TestPlatform::with_store(Arc::new(FailOnceIncomeStore::new()), test_config());
    let buyer = Uuid::now_v7();
    let order = platform
        .plan_order(buyer, platform.creator_plan, cny(2000))
        .await;
    let event = wallet_purchase(&order.order_no, "wallet-flaky-2");

    // The failure hits before the subscription effect runs.
    let err = platform.engine.reconcile(&event).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    assert!(platform.subscriptions.subscription(buyer).await.unwrap().is_none());

    let outcome = platform.engine.reconcile(&event).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate(order.order_no));

    let sub = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert!(sub.is_active(Utc::now()));
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);

    // A third delivery neither double-splits nor double-extends.
    let end = sub.end_date;
    platform.engine.reconcile(&event).await.unwrap();
    let sub = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert_eq!(sub.end_date, end);
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
}

// ── in-app purchases ────────────────────────────────────────────────────

#[tokio::test]
async fn iap_purchase_matches_the_pending_order() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let order = platform
        .plan_order(buyer, platform.creator_plan, cny(2000))
        .await;

    let outcome = platform
        .engine
        .reconcile(&iap_purchase(buyer, "iap-txn-1", None))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed(order.order_no.clone()));

    let paid = platform.ledger.order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.external_txn_id.as_deref(), Some("iap-txn-1"));
}

#[tokio::test]
async fn iap_purchase_without_pending_order_is_restored_at_catalog_price() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let event = iap_purchase(buyer, "iap-restored-1", None);

    let outcome = platform.engine.reconcile(&event).await.unwrap();
    let ReconcileOutcome::Restored(order_no) = outcome else {
        panic!("expected a restored purchase, got {outcome:?}");
    };

    let order = platform.ledger.order(&order_no).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.user_id, buyer);
    assert_eq!(order.related_id, platform.creator_plan);
    // Catalog price, never the receipt's.
    assert_eq!(order.money, cny(2000));

    assert!(platform.subscriptions.subscription(buyer).await.unwrap().is_some());

    let outcome = platform.engine.reconcile(&event).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate(order_no));
}

// ── renewals ────────────────────────────────────────────────────────────

#[tokio::test]
async fn renewal_extends_from_the_previous_end_date() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();

    platform
        .engine
        .reconcile(&iap_purchase(buyer, "iap-orig-1", Some("iap-orig-1")))
        .await
        .unwrap();
    let first = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();

    // Renewing 30 days early must not shorten the entitlement: the new
    // period stacks on the old end date.
    let outcome = platform
        .engine
        .reconcile(&renewal("iap-renew-1", "iap-orig-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Renewed(_)));

    let renewed = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert_eq!(renewed.end_date, first.end_date + Duration::days(30));
    assert_eq!(renewed.start_date, first.start_date);

    // One share per paid period.
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 2);

    // Redelivered renewal notice: no third entry, no further extension.
    let outcome = platform
        .engine
        .reconcile(&renewal("iap-renew-1", "iap-orig-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Duplicate(_)));
    let after = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert_eq!(after.end_date, renewed.end_date);
    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn orphan_renewal_is_dropped_without_writes() {
    let platform = TestPlatform::new();

    let outcome = platform
        .engine
        .reconcile(&renewal("iap-renew-x", "never-seen"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Orphaned);

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert!(entries.is_empty());
}

// ── cancellations ───────────────────────────────────────────────────────

#[tokio::test]
async fn provider_cancellation_keeps_entitlement_until_end_date() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();

    platform
        .engine
        .reconcile(&iap_purchase(buyer, "iap-orig-2", Some("iap-orig-2")))
        .await
        .unwrap();
    let active = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();

    let outcome = platform
        .engine
        .reconcile(&cancellation("iap-orig-2"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Cancelled(buyer));

    let cancelled = platform.subscriptions.subscription(buyer).await.unwrap().unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(!cancelled.auto_renew);
    assert_eq!(cancelled.end_date, active.end_date);

    // Repeat notice is idempotent.
    let outcome = platform
        .engine
        .reconcile(&cancellation("iap-orig-2"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Cancelled(buyer));
}

#[tokio::test]
async fn orphan_cancellation_is_dropped() {
    let platform = TestPlatform::new();
    let outcome = platform
        .engine
        .reconcile(&cancellation("never-seen"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Orphaned);
}

#[tokio::test]
async fn immediate_cancellation_ends_entitlement_now() {
    let platform = TestPlatform::new();
    let buyer = Uuid::now_v7();
    let order = platform
        .plan_order(buyer, platform.platform_plan, cny(1500))
        .await;
    platform
        .engine
        .reconcile(&wallet_purchase(&order.order_no, "wallet-sub-2"))
        .await
        .unwrap();

    let now = Utc::now();
    let sub = platform.subscriptions.cancel(buyer, true, now).await.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert_eq!(sub.end_date, now);
    assert!(!sub.is_active(now + Duration::seconds(1)));
}
