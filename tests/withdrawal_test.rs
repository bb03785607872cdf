mod common;

use {
    chrono::{Duration, Utc},
    common::{TestPlatform, cny, test_config, wallet_purchase},
    creator_pay::domain::{
        error::CoreError,
        income::WithdrawStatus,
        money::MoneyAmount,
        withdrawal::BatchStatus,
    },
    uuid::Uuid,
};

fn cents(v: i64) -> MoneyAmount {
    MoneyAmount::new(v).unwrap()
}

/// Pays `n` tips of 10.00 each into the fixture creator's balance
/// (7.00 net apiece at the 30% fee).
async fn earn_tips(platform: &TestPlatform, n: usize, tag: &str) {
    for i in 0..n {
        let order = platform.tip_order(Uuid::now_v7(), cny(1000)).await;
        platform
            .engine
            .reconcile(&wallet_purchase(&order.order_no, &format!("{tag}-{i}")))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn request_reserves_all_withdrawable_entries() {
    let platform = TestPlatform::new();
    earn_tips(&platform, 2, "wd-reserve").await;

    let batch = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Processing);
    assert_eq!(batch.entry_ids.len(), 2);
    assert_eq!(batch.total, cents(1400));
    assert_eq!(batch.method, "bank");
    assert!(batch.settled_at.is_none());

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    for entry in &entries {
        assert_eq!(entry.withdraw_status, WithdrawStatus::Processing);
        assert_eq!(entry.batch_id, Some(batch.batch_id));
    }

    // Nothing left to claim while the batch is open.
    let err = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn below_minimum_reserves_nothing() {
    let mut config = test_config();
    config.min_withdrawal = cents(1_000);
    let platform = TestPlatform::with_config(config);
    earn_tips(&platform, 1, "wd-min").await; // 7.00 net, under the 10.00 floor

    let err = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].withdraw_status, WithdrawStatus::Withdrawable);
    assert!(entries[0].batch_id.is_none());
}

#[tokio::test]
async fn request_requires_method_and_account() {
    let platform = TestPlatform::new();
    let err = platform
        .withdrawals
        .request_withdrawal(platform.creator, "", "acct-001")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn approval_pays_the_batch_out() {
    let platform = TestPlatform::new();
    earn_tips(&platform, 2, "wd-approve").await;

    let batch = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap();
    let settled = platform
        .withdrawals
        .settle_batch(batch.batch_id, true, None)
        .await
        .unwrap();

    assert_eq!(settled.status, BatchStatus::Completed);
    assert!(settled.settled_at.is_some());
    assert!(settled.failure_reason.is_none());

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert!(entries.iter().all(|e| e.withdraw_status == WithdrawStatus::Withdrawn));
}

#[tokio::test]
async fn rejection_releases_the_funds_for_a_retry() {
    let platform = TestPlatform::new();
    earn_tips(&platform, 2, "wd-reject").await;

    let batch = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap();
    let settled = platform
        .withdrawals
        .settle_batch(batch.batch_id, false, Some("account mismatch".into()))
        .await
        .unwrap();

    assert_eq!(settled.status, BatchStatus::Failed);
    assert_eq!(settled.failure_reason.as_deref(), Some("account mismatch"));

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    for entry in &entries {
        assert_eq!(entry.withdraw_status, WithdrawStatus::Withdrawable);
        assert!(entry.batch_id.is_none());
    }

    // The released funds go out on the next attempt.
    let retry = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-002")
        .await
        .unwrap();
    assert_eq!(retry.total, cents(1400));
    assert_ne!(retry.batch_id, batch.batch_id);
}

#[tokio::test]
async fn settling_twice_is_a_conflict() {
    let platform = TestPlatform::new();
    earn_tips(&platform, 1, "wd-twice").await;

    let batch = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap();
    platform
        .withdrawals
        .settle_batch(batch.batch_id, true, None)
        .await
        .unwrap();

    let err = platform
        .withdrawals
        .settle_batch(batch.batch_id, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn settling_an_unknown_batch_is_rejected() {
    let platform = TestPlatform::new();
    let err = platform
        .withdrawals
        .settle_batch(Uuid::now_v7(), true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn settlement_delay_holds_fresh_income_back() {
    let mut config = test_config();
    config.settlement_delay = Duration::days(7);
    let platform = TestPlatform::with_config(config);
    earn_tips(&platform, 1, "wd-delay").await;

    let entries = platform.withdrawals.income_entries(platform.creator).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].withdraw_status, WithdrawStatus::Pending);
    assert!(entries[0].available_at > Utc::now() + Duration::days(6));

    // Nothing has matured, so there is nothing to withdraw yet.
    let err = platform
        .withdrawals
        .request_withdrawal(platform.creator, "bank", "acct-001")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}
