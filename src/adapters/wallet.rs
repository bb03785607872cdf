use {
    super::{AdapterFuture, GatewayAdapter, RawNotification},
    crate::domain::error::AdapterError,
    crate::domain::event::{EventKind, PaymentEvent},
    crate::domain::money::{Currency, Money, MoneyAmount},
    crate::domain::order::OrderNo,
    chrono::{DateTime, TimeZone, Utc},
    hmac::{Hmac, Mac},
    serde::Deserialize,
    sha2::Sha256,
    std::sync::Arc,
    subtle::ConstantTimeEq,
    uuid::Uuid,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for a signed notification (replay window).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future timestamps.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Signature header components: `t=<unix>,v1=<hex>`.
struct SignatureHeader {
    timestamp: i64,
    v1: Vec<u8>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, AdapterError> {
        let mut timestamp = None;
        let mut v1 = None;
        for part in header.split(',') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                AdapterError::SignatureMismatch("invalid signature header format".into())
            })?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        AdapterError::SignatureMismatch("invalid signature timestamp".into())
                    })?);
                }
                "v1" => {
                    v1 = Some(hex::decode(value).map_err(|_| {
                        AdapterError::SignatureMismatch("invalid signature hex".into())
                    })?);
                }
                // Unknown fields are ignored for forward compatibility.
                _ => {}
            }
        }
        Ok(Self {
            timestamp: timestamp.ok_or_else(|| {
                AdapterError::SignatureMismatch("missing signature timestamp".into())
            })?,
            v1: v1.ok_or_else(|| {
                AdapterError::SignatureMismatch("missing v1 signature".into())
            })?,
        })
    }
}

/// Wire shape of a wallet/card gateway notification.
#[derive(Debug, Deserialize)]
struct WalletNotification {
    notify_type: String,
    /// Merchant order number, echoed back by the gateway.
    out_trade_no: String,
    /// Gateway transaction id.
    trade_no: String,
    amount_cents: i64,
    currency: String,
    #[serde(default)]
    user_id: Option<Uuid>,
    /// Unix seconds.
    paid_at: i64,
}

/// Card/wallet gateway adapter. Notifications are HMAC-SHA256 signed over
/// `"{timestamp}.{body}"`; the merchant order number rides along out of
/// band, so purchase events map straight onto a pending order.
pub struct WalletGatewayAdapter {
    provider: &'static str,
    secret: Arc<str>,
}

impl WalletGatewayAdapter {
    pub fn new(provider: &'static str, secret: impl Into<Arc<str>>) -> Self {
        Self {
            provider,
            secret: secret.into(),
        }
    }

    fn verify_signature(
        &self,
        header: &str,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<(), AdapterError> {
        let sig = SignatureHeader::parse(header)?;

        let age = received_at.timestamp() - sig.timestamp;
        if age > MAX_EVENT_AGE_SECS {
            return Err(AdapterError::SignatureMismatch(format!(
                "notification too old: {age}s"
            )));
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(AdapterError::SignatureMismatch(
                "notification timestamp in the future".into(),
            ));
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AdapterError::SignatureMismatch("invalid signing key".into()))?;
        mac.update(format!("{}.{}", sig.timestamp, body).as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.ct_eq(&sig.v1).into() {
            Ok(())
        } else {
            Err(AdapterError::SignatureMismatch(
                "signature does not match payload".into(),
            ))
        }
    }

    fn to_event(&self, n: WalletNotification) -> Result<Option<PaymentEvent>, AdapterError> {
        let kind = match n.notify_type.as_str() {
            "trade_success" => EventKind::Purchase,
            // Lifecycle noise is valid but carries nothing to reconcile:
            // closed/created notices, and refund confirmations (refunds are
            // operator-driven through the refund endpoint, the gateway's
            // notice only confirms them).
            "trade_closed" | "trade_created" | "refund_success" => return Ok(None),
            other => {
                return Err(AdapterError::MalformedPayload(format!(
                    "unsupported notify_type: {other}"
                )));
            }
        };

        let amount = MoneyAmount::new(n.amount_cents)
            .map_err(|_| AdapterError::MalformedPayload("negative amount".into()))?;
        let currency = Currency::try_from(n.currency.as_str())
            .map_err(|_| AdapterError::MalformedPayload(format!("bad currency: {}", n.currency)))?;
        let order_no = OrderNo::parse(n.out_trade_no)
            .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;
        let purchased_at = Utc
            .timestamp_opt(n.paid_at, 0)
            .single()
            .ok_or_else(|| AdapterError::MalformedPayload("bad paid_at timestamp".into()))?;

        Ok(Some(PaymentEvent {
            provider: self.provider.to_string(),
            external_txn_id: n.trade_no,
            original_txn_id: None,
            order_no: Some(order_no),
            user_id: n.user_id,
            money: Some(Money::new(amount, currency)),
            product_id: None,
            purchased_at,
            kind,
        }))
    }
}

impl GatewayAdapter for WalletGatewayAdapter {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn normalize(&self, raw: &RawNotification) -> AdapterFuture<'_, Vec<PaymentEvent>> {
        let raw = raw.clone();
        Box::pin(async move {
            let header = raw.signature.as_deref().ok_or_else(|| {
                AdapterError::SignatureMismatch("missing signature header".into())
            })?;
            self.verify_signature(header, &raw.body, raw.received_at)?;

            let notification: WalletNotification = serde_json::from_str(&raw.body)
                .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

            if notification.trade_no.is_empty() {
                return Err(AdapterError::MalformedPayload("empty trade_no".into()));
            }

            Ok(self.to_event(notification)?.into_iter().collect())
        })
    }
}

#[cfg(test)]
pub fn sign_body(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
