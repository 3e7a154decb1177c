//! Infrastructure layer: item persistence, stock service orchestration, configuration.

pub mod config;
pub mod item_store;
pub mod stock_service;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, StockroomConfig};
pub use item_store::{InMemoryItemStore, ItemStore, PostgresItemStore, StoreError, connect_store};
pub use stock_service::{MovementOutcome, StockError, StockService};
