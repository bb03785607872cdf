use {
    super::{AdapterFuture, GatewayAdapter, RawNotification},
    crate::domain::error::AdapterError,
    crate::domain::event::{EventKind, PaymentEvent},
    chrono::{TimeZone, Utc},
    serde::Deserialize,
    std::sync::Arc,
    std::time::Duration,
    uuid::Uuid,
};

/// One product transaction embedded in a verified receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    pub product_id: String,
    /// Unix seconds.
    pub purchase_ts: i64,
}

/// Provider verdict on a submitted receipt blob.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedReceipt {
    pub status: i64,
    #[serde(default)]
    pub transactions: Vec<ReceiptTransaction>,
}

/// Checks a signed receipt against the provider's servers or trust store.
/// Implementations must be time-bounded: a hung verification maps to
/// `AdapterError::Timeout`, which the webhook layer answers retryably —
/// never a false acknowledgment.
pub trait ReceiptVerifier: Send + Sync {
    fn verify(&self, receipt_blob: &str) -> AdapterFuture<'_, VerifiedReceipt>;
}

/// Verifies receipts by POSTing them to the provider's verification
/// endpoint.
pub struct HttpReceiptVerifier {
    http: reqwest::Client,
    verify_url: String,
    timeout_ms: u64,
}

impl HttpReceiptVerifier {
    pub fn new(verify_url: String, timeout_ms: u64) -> Result<Self, AdapterError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AdapterError::InvalidReceipt(format!("verifier client: {e}")))?;
        Ok(Self {
            http,
            verify_url,
            timeout_ms,
        })
    }
}

impl ReceiptVerifier for HttpReceiptVerifier {
    fn verify(&self, receipt_blob: &str) -> AdapterFuture<'_, VerifiedReceipt> {
        let blob = receipt_blob.to_string();
        Box::pin(async move {
            let request = self
                .http
                .post(&self.verify_url)
                .json(&serde_json::json!({ "receipt-data": blob }))
                .send();

            let response = tokio::time::timeout(Duration::from_millis(self.timeout_ms), request)
                .await
                .map_err(|_| AdapterError::Timeout(self.timeout_ms))?
                .map_err(|e| {
                    if e.is_timeout() {
                        AdapterError::Timeout(self.timeout_ms)
                    } else {
                        AdapterError::InvalidReceipt(format!("verification call failed: {e}"))
                    }
                })?;

            response
                .json::<VerifiedReceipt>()
                .await
                .map_err(|e| AdapterError::MalformedPayload(format!("verifier response: {e}")))
        })
    }
}

/// Receipt submission: the app hands over the signed blob together with the
/// authenticated buyer.
#[derive(Debug, Deserialize)]
struct ReceiptSubmission {
    receipt_data: String,
    user_id: Uuid,
}

/// Server-to-server subscription notice.
#[derive(Debug, Deserialize)]
struct ServerNotification {
    notification_type: String,
    original_transaction_id: String,
    #[serde(default)]
    transaction_id: Option<String>,
    /// Unix seconds; defaults to receipt time when the provider omits it.
    #[serde(default)]
    event_ts: Option<i64>,
}

/// In-app purchase adapter. Handles two payload shapes on the same
/// endpoint: signed receipt submissions (verified remotely, one purchase
/// event per embedded transaction) and server-to-server renewal or
/// cancellation notices.
pub struct ReceiptGatewayAdapter {
    provider: &'static str,
    verifier: Arc<dyn ReceiptVerifier>,
}

impl ReceiptGatewayAdapter {
    pub fn new(provider: &'static str, verifier: Arc<dyn ReceiptVerifier>) -> Self {
        Self { provider, verifier }
    }

    async fn normalize_submission(
        &self,
        submission: ReceiptSubmission,
    ) -> Result<Vec<PaymentEvent>, AdapterError> {
        let verdict = self.verifier.verify(&submission.receipt_data).await?;

        match verdict.status {
            0 => {}
            // The provider's "could not read the blob" class of statuses.
            21002 => {
                return Err(AdapterError::MalformedPayload(
                    "receipt data unreadable (status 21002)".into(),
                ));
            }
            other => {
                return Err(AdapterError::InvalidReceipt(format!(
                    "receipt rejected with status {other}"
                )));
            }
        }

        if verdict.transactions.is_empty() {
            return Err(AdapterError::InvalidReceipt(
                "verified receipt carries no transactions".into(),
            ));
        }

        verdict
            .transactions
            .into_iter()
            .map(|txn| {
                let purchased_at = Utc
                    .timestamp_opt(txn.purchase_ts, 0)
                    .single()
                    .ok_or_else(|| {
                        AdapterError::MalformedPayload("bad purchase timestamp".into())
                    })?;
                Ok(PaymentEvent {
                    provider: self.provider.to_string(),
                    external_txn_id: txn.transaction_id,
                    original_txn_id: txn.original_transaction_id,
                    order_no: None,
                    user_id: Some(submission.user_id),
                    // Receipt-reported prices are never trusted; catalog
                    // pricing is authoritative downstream.
                    money: None,
                    product_id: Some(txn.product_id),
                    purchased_at,
                    kind: EventKind::Purchase,
                })
            })
            .collect()
    }

    fn normalize_notification(
        &self,
        notice: ServerNotification,
        received_ts: i64,
    ) -> Result<Vec<PaymentEvent>, AdapterError> {
        let kind = match notice.notification_type.as_str() {
            "DID_RENEW" | "INTERACTIVE_RENEWAL" => EventKind::Renewal,
            "CANCEL" | "DID_REVOKE" => EventKind::Cancellation,
            // Renewal-preference chatter carries nothing to reconcile.
            "DID_CHANGE_RENEWAL_PREF" | "DID_CHANGE_RENEWAL_STATUS" => return Ok(Vec::new()),
            other => {
                return Err(AdapterError::MalformedPayload(format!(
                    "unsupported notification_type: {other}"
                )));
            }
        };

        if notice.original_transaction_id.is_empty() {
            return Err(AdapterError::MalformedPayload(
                "empty original_transaction_id".into(),
            ));
        }

        let ts = notice.event_ts.unwrap_or(received_ts);
        let purchased_at = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| AdapterError::MalformedPayload("bad event timestamp".into()))?;

        // Cancellations carry no fresh transaction; fall back to the
        // original id so the event still has a stable key for logging.
        let external_txn_id = notice
            .transaction_id
            .unwrap_or_else(|| notice.original_transaction_id.clone());

        Ok(vec![PaymentEvent {
            provider: self.provider.to_string(),
            external_txn_id,
            original_txn_id: Some(notice.original_transaction_id),
            order_no: None,
            user_id: None,
            money: None,
            product_id: None,
            purchased_at,
            kind,
        }])
    }
}

impl GatewayAdapter for ReceiptGatewayAdapter {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn normalize(&self, raw: &RawNotification) -> AdapterFuture<'_, Vec<PaymentEvent>> {
        let raw = raw.clone();
        Box::pin(async move {
            let value: serde_json::Value = serde_json::from_str(&raw.body)
                .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;

            if value.get("notification_type").is_some() {
                let notice: ServerNotification = serde_json::from_value(value)
                    .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;
                self.normalize_notification(notice, raw.received_at.timestamp())
            } else {
                let submission: ReceiptSubmission = serde_json::from_value(value)
                    .map_err(|e| AdapterError::MalformedPayload(e.to_string()))?;
                self.normalize_submission(submission).await
            }
        })
    }
}
