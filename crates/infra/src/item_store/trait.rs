use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::{ExpectedVersion, ItemId};
use stockroom_inventory::{Item, ItemMetadata, Movement, NewItem};

/// Item store operation error.
///
/// These are storage-side failures, kept apart from domain validation so a
/// caller can tell "nothing to do" from "storage broke".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// The stored revision no longer matches what the writer read.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// The write itself was malformed (e.g. empty id list, mismatched records).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend failed; the unit of work was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Persistent item and movement storage.
///
/// ## Atomicity
///
/// - `commit_movement` writes the item's stock fields and inserts the movement
///   in one unit of work, guarded by a revision check. Either both land or
///   neither does.
/// - `bulk_create_items` is all-or-nothing.
/// - Deleting an item deletes its movements.
///
/// ## Ordering
///
/// `list_items` and `list_movements` return newest first.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point lookup.
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items, newest first.
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    /// Persist the stock-side fields of `item` (stock, revision, update time)
    /// and append `movement`, provided the stored revision matches
    /// `expected_version`.
    async fn commit_movement(
        &self,
        item: &Item,
        movement: &Movement,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Insert one item with empty stock.
    async fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError>;

    /// Insert a batch of items; nothing is persisted if any insert fails.
    async fn bulk_create_items(&self, new_items: Vec<NewItem>) -> Result<Vec<Item>, StoreError>;

    /// Rename / recategorise an item. Stock fields are untouched.
    async fn update_item_metadata(
        &self,
        id: ItemId,
        metadata: ItemMetadata,
    ) -> Result<Item, StoreError>;

    /// Delete one item and its movements.
    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError>;

    /// Delete every listed item that exists (with movements); returns how many were deleted.
    async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StoreError>;

    /// Movement history of one item, newest first.
    async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError>;
}

#[async_trait]
impl<S> ItemStore for Arc<S>
where
    S: ItemStore + ?Sized,
{
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(id).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }

    async fn commit_movement(
        &self,
        item: &Item,
        movement: &Movement,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).commit_movement(item, movement, expected_version).await
    }

    async fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError> {
        (**self).create_item(new_item).await
    }

    async fn bulk_create_items(&self, new_items: Vec<NewItem>) -> Result<Vec<Item>, StoreError> {
        (**self).bulk_create_items(new_items).await
    }

    async fn update_item_metadata(
        &self,
        id: ItemId,
        metadata: ItemMetadata,
    ) -> Result<Item, StoreError> {
        (**self).update_item_metadata(id, metadata).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        (**self).delete_item(id).await
    }

    async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StoreError> {
        (**self).delete_items(ids).await
    }

    async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        (**self).list_movements(item_id).await
    }
}

/// Checks shared by every backend before a movement commit touches storage.
pub(crate) fn validate_commit(item: &Item, movement: &Movement) -> Result<(), StoreError> {
    use stockroom_core::Versioned;

    if movement.item_id != *item.id() {
        return Err(StoreError::InvalidRequest(format!(
            "movement {} belongs to item {}, not {}",
            movement.id,
            movement.item_id,
            item.id()
        )));
    }
    Ok(())
}

pub(crate) fn ensure_ids(ids: &[ItemId]) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Err(StoreError::InvalidRequest("no item ids provided".to_string()));
    }
    Ok(())
}
