//! Item persistence boundary.
//!
//! The `ItemStore` trait owns item and movement records. A stock mutation
//! writes the updated item and its movement through `commit_movement` so the
//! two can never diverge.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryItemStore;
pub use postgres::PostgresItemStore;
pub use r#trait::{ItemStore, StoreError};

use std::sync::Arc;

use crate::config::StockroomConfig;

/// Pick the backend for `config`: Postgres when a database URL is set,
/// otherwise an empty in-memory store.
pub async fn connect_store(config: &StockroomConfig) -> Result<Arc<dyn ItemStore>, StoreError> {
    match config.database_url {
        Some(_) => Ok(Arc::new(PostgresItemStore::connect(config).await?)),
        None => {
            tracing::info!("using in-memory item store");
            Ok(Arc::new(InMemoryItemStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_inventory::NewItem;

    #[tokio::test]
    async fn no_database_url_selects_in_memory_store() {
        let store = connect_store(&StockroomConfig::default()).await.unwrap();
        let item = store
            .create_item(NewItem::new("Fuse", "Electrical", None).unwrap())
            .await
            .unwrap();
        assert_eq!(store.list_items().await.unwrap(), vec![item]);
    }
}
