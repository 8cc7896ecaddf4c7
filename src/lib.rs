pub mod common_utils;
pub mod configure;
pub mod error;
pub mod logging;
pub mod models;
pub mod order_store;
pub mod wal;
