use {
    super::error::CoreError,
    super::money::MoneyAmount,
    super::order::OrderNo,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    ContentSale,
    Tip,
    SubscriptionShare,
}

impl IncomeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentSale => "content_sale",
            Self::Tip => "tip",
            Self::SubscriptionShare => "subscription_share",
        }
    }
}

impl fmt::Display for IncomeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for IncomeSource {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "content_sale" => Ok(Self::ContentSale),
            "tip" => Ok(Self::Tip),
            "subscription_share" => Ok(Self::SubscriptionShare),
            other => Err(CoreError::Validation(format!(
                "unknown income source: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawStatus {
    Pending,
    Withdrawable,
    Processing,
    Withdrawn,
    Failed,
}

impl WithdrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Withdrawable => "withdrawable",
            Self::Processing => "processing",
            Self::Withdrawn => "withdrawn",
            Self::Failed => "failed",
        }
    }

    /// Forward-only, with one exception: a rejected batch releases its
    /// entries back to `Withdrawable` so the funds stay claimable.
    pub fn can_transition_to(&self, next: &WithdrawStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawStatus::Pending, WithdrawStatus::Withdrawable)
                | (WithdrawStatus::Withdrawable, WithdrawStatus::Processing)
                | (WithdrawStatus::Processing, WithdrawStatus::Withdrawn)
                | (WithdrawStatus::Processing, WithdrawStatus::Failed)
                | (WithdrawStatus::Processing, WithdrawStatus::Withdrawable)
        )
    }
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for WithdrawStatus {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "withdrawable" => Ok(Self::Withdrawable),
            "processing" => Ok(Self::Processing),
            "withdrawn" => Ok(Self::Withdrawn),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "unknown withdraw status: {other}"
            ))),
        }
    }
}

/// Immutable record of a creator's share of one paid order. Exactly one
/// entry exists per `(source_order_no, creator_id)`; only `withdraw_status`
/// and `batch_id` ever change after creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatorIncomeEntry {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub source_order_no: OrderNo,
    pub source: IncomeSource,
    pub total: MoneyAmount,
    pub platform_fee: MoneyAmount,
    pub net: MoneyAmount,
    pub withdraw_status: WithdrawStatus,
    /// When a `Pending` entry matures into `Withdrawable`.
    pub available_at: DateTime<Utc>,
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
