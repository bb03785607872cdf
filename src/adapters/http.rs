use {
    super::{GatewayAdapter, RawNotification, api_errors::ApiError},
    crate::{
        AppState,
        domain::{
            error::CoreError,
            event::ReconcileOutcome,
            money::{Currency, Money, MoneyAmount},
            order::{NewOrderRequest, OrderNo, OrderType},
        },
    },
    axum::{
        Json,
        extract::{Path, State},
        http::HeaderMap,
    },
    chrono::Utc,
    serde::Deserialize,
    uuid::Uuid,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub user_id: Uuid,
    pub order_type: String,
    pub related_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let money = Money::new(
        MoneyAmount::new(body.amount_cents)?,
        Currency::try_from(body.currency.as_str())?,
    );
    let order = state
        .ledger
        .create_order(NewOrderRequest {
            user_id: body.user_id,
            order_type: OrderType::try_from(body.order_type.as_str())?,
            related_id: body.related_id,
            money,
            payment_method: body.payment_method,
            description: body.description,
        })
        .await?;
    Ok(Json(serde_json::json!({ "order": order })))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_no = OrderNo::parse(order_no)?;
    let order = state
        .ledger
        .order(&order_no)
        .await?
        .ok_or_else(|| CoreError::Validation(format!("unknown order: {order_no}")))?;
    Ok(Json(serde_json::json!({ "order": order })))
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub amount_cents: i64,
    pub currency: String,
    pub reason: String,
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_no = OrderNo::parse(order_no)?;
    let amount = Money::new(
        MoneyAmount::new(body.amount_cents)?,
        Currency::try_from(body.currency.as_str())?,
    );
    let order = state
        .ledger
        .refund_order(&order_no, amount, &body.reason)
        .await?;
    Ok(Json(serde_json::json!({ "order": order })))
}

fn outcome_status(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Completed(_) => "completed",
        ReconcileOutcome::Duplicate(_) => "duplicate",
        ReconcileOutcome::Restored(_) => "restored",
        ReconcileOutcome::Renewed(_) => "renewed",
        ReconcileOutcome::Cancelled(_) => "cancelled",
        ReconcileOutcome::Orphaned => "orphaned",
    }
}

/// Normalize then reconcile every event in the payload. The provider gets
/// an acknowledgment only after all writes committed — adapter failures map
/// to 4xx, store failures to 5xx so the provider redelivers.
async fn run_webhook(
    state: &AppState,
    adapter: &dyn GatewayAdapter,
    raw: RawNotification,
) -> Result<Json<serde_json::Value>, ApiError> {
    let events = adapter.normalize(&raw).await?;

    let mut results = Vec::with_capacity(events.len());
    for event in &events {
        let outcome = state.engine.reconcile(event).await?;
        tracing::info!(
            provider = %event.provider,
            txn_id = %event.external_txn_id,
            kind = %event.kind,
            status = outcome_status(&outcome),
            "event reconciled"
        );
        results.push(outcome_status(&outcome));
    }

    Ok(Json(serde_json::json!({ "results": results })))
}

#[tracing::instrument(name = "wallet_webhook", skip_all)]
pub async fn wallet_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("X-Wallet-Signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let raw = RawNotification {
        body,
        signature,
        received_at: Utc::now(),
    };
    run_webhook(&state, state.wallet.as_ref(), raw).await
}

#[tracing::instrument(name = "appstore_webhook", skip_all)]
pub async fn appstore_webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw = RawNotification {
        body,
        signature: None,
        received_at: Utc::now(),
    };
    run_webhook(&state, state.appstore.as_ref(), raw).await
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionBody {
    pub user_id: Uuid,
    #[serde(default)]
    pub effective_immediately: bool,
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Json(body): Json<CancelSubscriptionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sub = state
        .subscriptions
        .cancel(body.user_id, body.effective_immediately, Utc::now())
        .await?;
    Ok(Json(serde_json::json!({ "subscription": sub })))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub creator_id: Uuid,
    pub method: String,
    pub account: String,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Json(body): Json<WithdrawalBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let batch = state
        .withdrawals
        .request_withdrawal(body.creator_id, &body.method, &body.account)
        .await?;
    Ok(Json(serde_json::json!({ "batch": batch })))
}

#[derive(Debug, Deserialize)]
pub struct SettleBody {
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn settle_withdrawal(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(body): Json<SettleBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let batch = state
        .withdrawals
        .settle_batch(batch_id, body.approved, body.reason)
        .await?;
    Ok(Json(serde_json::json!({ "batch": batch })))
}

pub async fn creator_income(
    State(state): State<AppState>,
    Path(creator_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.withdrawals.income_entries(creator_id).await?;
    Ok(Json(serde_json::json!({ "entries": entries })))
}
