use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    creator_pay::{
        AppState,
        adapters::{
            receipt::{HttpReceiptVerifier, ReceiptGatewayAdapter},
            wallet::WalletGatewayAdapter,
        },
        config::PlatformConfig,
        domain::catalog::StaticCatalog,
        store::postgres::PgStore,
    },
    sqlx::postgres::PgPoolOptions,
    std::{env, sync::Arc, time::Duration},
    tokio::signal,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let wallet_secret = env::var("WALLET_WEBHOOK_SECRET").expect("WALLET_WEBHOOK_SECRET must be set");
    let receipt_verify_url =
        env::var("RECEIPT_VERIFY_URL").expect("RECEIPT_VERIFY_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let verifier = HttpReceiptVerifier::new(receipt_verify_url, 10_000)
        .expect("failed to build receipt verifier");

    // The real platform injects its content/plan catalog here; the core
    // only reads prices and owners through the trait.
    let catalog = Arc::new(StaticCatalog::new());

    let state = AppState::assemble(
        Arc::new(PgStore::new(pool)),
        catalog,
        PlatformConfig::from_env(),
        Arc::new(WalletGatewayAdapter::new("wallet", wallet_secret)),
        Arc::new(ReceiptGatewayAdapter::new("appstore", Arc::new(verifier))),
    );

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/orders", post(creator_pay::adapters::http::create_order))
        .route(
            "/orders/{order_no}",
            get(creator_pay::adapters::http::get_order),
        )
        .route(
            "/orders/{order_no}/refund",
            post(creator_pay::adapters::http::refund_order),
        )
        .route(
            "/webhooks/wallet",
            post(creator_pay::adapters::http::wallet_webhook),
        )
        .route(
            "/webhooks/appstore",
            post(creator_pay::adapters::http::appstore_webhook),
        )
        .route(
            "/subscriptions/cancel",
            post(creator_pay::adapters::http::cancel_subscription),
        )
        .route(
            "/withdrawals",
            post(creator_pay::adapters::http::request_withdrawal),
        )
        .route(
            "/withdrawals/{batch_id}/settle",
            post(creator_pay::adapters::http::settle_withdrawal),
        )
        .route(
            "/creators/{creator_id}/income",
            get(creator_pay::adapters::http::creator_income),
        )
        .layer(DefaultBodyLimit::max(64 * 1024)) // webhook payloads are small
        .layer(TimeoutLayer::new(Duration::from_secs(15)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("listening on 0.0.0.0:3000");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
