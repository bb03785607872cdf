pub mod adapters;
pub mod config;
pub mod domain;
pub mod services;
pub mod store;

use {
    crate::adapters::{receipt::ReceiptGatewayAdapter, wallet::WalletGatewayAdapter},
    crate::services::{
        ledger::OrderLedger, lifecycle::SubscriptionManager, reconcile::ReconciliationEngine,
        splitter::RevenueSplitter, withdrawal::WithdrawalProcessor,
    },
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: ReconciliationEngine,
    pub ledger: OrderLedger,
    pub subscriptions: SubscriptionManager,
    pub withdrawals: WithdrawalProcessor,
    pub wallet: Arc<WalletGatewayAdapter>,
    pub appstore: Arc<ReceiptGatewayAdapter>,
}

impl AppState {
    /// Wire the core services over a store and catalog. The engine owns
    /// the only composition of ledger, splitter and subscription manager —
    /// nothing else reaches around it to mutate shared state.
    pub fn assemble(
        store: Arc<dyn store::LedgerStore>,
        catalog: Arc<dyn domain::catalog::Catalog>,
        config: config::PlatformConfig,
        wallet: Arc<WalletGatewayAdapter>,
        appstore: Arc<ReceiptGatewayAdapter>,
    ) -> Self {
        let ledger = OrderLedger::new(store.clone(), catalog.clone());
        let splitter = RevenueSplitter::new(store.clone(), catalog.clone(), config.clone());
        let subscriptions = SubscriptionManager::new(store.clone(), catalog.clone());
        let withdrawals = WithdrawalProcessor::new(store.clone(), config);
        let engine = ReconciliationEngine::new(
            store,
            catalog,
            ledger.clone(),
            splitter,
            subscriptions.clone(),
        );
        Self {
            engine,
            ledger,
            subscriptions,
            withdrawals,
            wallet,
            appstore,
        }
    }
}
