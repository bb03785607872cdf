pub mod catalog;
pub mod error;
pub mod event;
pub mod income;
pub mod money;
pub mod order;
pub mod subscription;
pub mod withdrawal;
