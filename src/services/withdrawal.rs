use {
    crate::config::PlatformConfig,
    crate::domain::error::CoreError,
    crate::domain::income::CreatorIncomeEntry,
    crate::domain::money::MoneyAmount,
    crate::domain::withdrawal::{BatchStatus, WithdrawalBatch},
    crate::store::LedgerStore,
    chrono::Utc,
    std::sync::Arc,
    uuid::Uuid,
};

/// Drives income entries through the withdrawal state machine. The store's
/// atomic reservation guarantees two concurrent requests from the same
/// creator never claim the same entry.
#[derive(Clone)]
pub struct WithdrawalProcessor {
    store: Arc<dyn LedgerStore>,
    config: PlatformConfig,
}

impl WithdrawalProcessor {
    pub fn new(store: Arc<dyn LedgerStore>, config: PlatformConfig) -> Self {
        Self { store, config }
    }

    /// Reserve every withdrawable entry of the creator under a new batch.
    /// Rejects (and reserves nothing) when the net sum falls below the
    /// configured minimum.
    pub async fn request_withdrawal(
        &self,
        creator_id: Uuid,
        method: &str,
        account: &str,
    ) -> Result<WithdrawalBatch, CoreError> {
        if method.is_empty() || account.is_empty() {
            return Err(CoreError::Validation(
                "withdrawal method and account are required".into(),
            ));
        }

        let now = Utc::now();
        self.store.release_matured_entries(creator_id, now).await?;

        let batch_id = Uuid::now_v7();
        let entries = self
            .store
            .reserve_withdrawable(creator_id, batch_id, self.config.min_withdrawal)
            .await?;

        let total = entries
            .iter()
            .try_fold(MoneyAmount::zero(), |acc, e| acc.checked_add(e.net))
            .ok_or_else(|| CoreError::Validation("withdrawal total overflow".into()))?;

        let batch = WithdrawalBatch {
            batch_id,
            creator_id,
            entry_ids: entries.iter().map(|e| e.id).collect(),
            method: method.to_string(),
            account: account.to_string(),
            total,
            status: BatchStatus::Processing,
            requested_at: now,
            settled_at: None,
            failure_reason: None,
        };

        self.store.insert_batch(batch.clone()).await?;
        tracing::info!(
            batch_id = %batch_id,
            creator_id = %creator_id,
            entries = batch.entry_ids.len(),
            total = %total,
            "withdrawal batch opened"
        );
        Ok(batch)
    }

    /// Approved batches pay out (`withdrawn`); rejected ones release the
    /// entries back to `withdrawable` so the funds stay claimable.
    pub async fn settle_batch(
        &self,
        batch_id: Uuid,
        approved: bool,
        reason: Option<String>,
    ) -> Result<WithdrawalBatch, CoreError> {
        let batch = self
            .store
            .settle_batch(batch_id, approved, reason, Utc::now())
            .await?;
        tracing::info!(batch_id = %batch_id, status = %batch.status, "withdrawal batch settled");
        Ok(batch)
    }

    pub async fn income_entries(
        &self,
        creator_id: Uuid,
    ) -> Result<Vec<CreatorIncomeEntry>, CoreError> {
        self.store.income_entries(creator_id).await
    }

    pub async fn batch(&self, batch_id: Uuid) -> Result<Option<WithdrawalBatch>, CoreError> {
        self.store.batch(batch_id).await
    }
}
