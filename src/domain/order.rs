use {
    super::error::CoreError,
    super::money::Money,
    chrono::{DateTime, Utc},
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Merchant order number. Generated at creation, globally unique:
/// UTC second prefix plus the random tail of a UUIDv7 — no coordination
/// between processes needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNo(String);

impl OrderNo {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let uuid = Uuid::now_v7().simple().to_string();
        Self(format!("{}{}", now.format("%Y%m%d%H%M%S"), &uuid[20..]))
    }

    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.len() < 16 || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Validation(format!("malformed order no: {s}")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Subscription,
    Content,
    Tip,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Content => "content",
            Self::Tip => "tip",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderType {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "subscription" => Ok(Self::Subscription),
            "content" => Ok(Self::Content),
            "tip" => Ok(Self::Tip),
            other => Err(CoreError::Validation(format!(
                "unknown order type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Lifecycle rank — higher means further along. Transitions never
    /// decrease rank, so out-of-order events cannot regress an order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid | Self::Failed | Self::Cancelled => 1,
            Self::Refunded => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Refunded)
    }

    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(CoreError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }
}

/// Refund sub-record attached to an order once a refund is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub amount: Money,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: RefundStatus,
}

/// One monetary transaction request and its lifecycle record.
/// Mutated only through the ledger's conditional transitions; never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_no: OrderNo,
    pub user_id: Uuid,
    pub order_type: OrderType,
    /// Plan, content or creator reference, depending on `order_type`.
    pub related_id: Uuid,
    pub money: Money,
    pub payment_method: String,
    pub status: OrderStatus,
    /// Gateway-assigned transaction id. Unique across all orders once set.
    pub external_txn_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund: Option<Refund>,
    /// Why the order failed or was cancelled, when it was.
    pub failure_reason: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Validated input for order creation.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub user_id: Uuid,
    pub order_type: OrderType,
    pub related_id: Uuid,
    pub money: Money,
    pub payment_method: String,
    pub description: String,
}
