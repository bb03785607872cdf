pub mod ledger;
pub mod lifecycle;
pub mod reconcile;
pub mod splitter;
pub mod withdrawal;
