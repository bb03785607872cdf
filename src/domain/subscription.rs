use {
    super::error::CoreError,
    super::order::OrderNo,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SubscriptionStatus {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(CoreError::Validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// Recurring entitlement owned by a user. At most one row per user;
/// renewals extend the same row rather than creating a new one.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renew: bool,
    /// Order that most recently (re)activated this subscription.
    pub last_order_no: OrderNo,
    /// Provider's original transaction id — links server-to-server
    /// renewal and cancellation notices back to this row.
    pub original_txn_id: Option<String>,
}

impl Subscription {
    /// Cancellation keeps the entitlement until `end_date`, so status
    /// alone does not decide.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now <= self.end_date
    }
}
