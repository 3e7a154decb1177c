use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use stockroom_core::{ExpectedVersion, ItemId, Versioned};
use stockroom_inventory::{Item, ItemMetadata, Movement, NewItem};

use super::r#trait::{ItemStore, StoreError, ensure_ids, validate_commit};

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    /// Per-item history in insertion order (oldest first).
    movements: HashMap<ItemId, Vec<Movement>>,
}

/// In-memory item store.
///
/// Intended for tests/dev. Every operation runs under a single lock, which
/// gives the same atomicity as a database transaction: a commit either updates
/// the item and appends the movement, or changes nothing.
#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    state: RwLock<State>,
    item_limit: Option<usize>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses to hold more than `limit` items, failing the
    /// whole write that would exceed it. Useful for exercising rollback paths.
    pub fn with_item_limit(limit: usize) -> Self {
        Self {
            state: RwLock::default(),
            item_limit: Some(limit),
        }
    }

    fn ensure_capacity(&self, state: &State, additional: usize) -> Result<(), StoreError> {
        match self.item_limit {
            Some(limit) if state.items.len() + additional > limit => Err(StoreError::Persistence(
                format!("item limit of {limit} reached"),
            )),
            _ => Ok(()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }
}

fn newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(a.id()))
    });
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self.read()?.items.values().cloned().collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn commit_movement(
        &self,
        item: &Item,
        movement: &Movement,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        validate_commit(item, movement)?;

        let mut state = self.write()?;
        let id = *item.id();
        let stored = state.items.get(&id).ok_or(StoreError::NotFound(id))?;

        if !expected_version.matches(stored.version()) {
            return Err(StoreError::Conflict(format!(
                "item {id}: expected {expected_version:?}, found {}",
                stored.version()
            )));
        }

        let committed = stored.clone().with_committed_stock(item);
        state.items.insert(id, committed);
        state.movements.entry(id).or_default().push(movement.clone());
        Ok(())
    }

    async fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError> {
        let mut state = self.write()?;
        self.ensure_capacity(&state, 1)?;

        let item = Item::create(new_item, Utc::now());
        state.items.insert(*item.id(), item.clone());
        Ok(item)
    }

    async fn bulk_create_items(&self, new_items: Vec<NewItem>) -> Result<Vec<Item>, StoreError> {
        let mut state = self.write()?;
        self.ensure_capacity(&state, new_items.len())?;

        let now = Utc::now();
        let created: Vec<Item> = new_items
            .into_iter()
            .map(|new_item| Item::create(new_item, now))
            .collect();
        for item in &created {
            state.items.insert(*item.id(), item.clone());
        }
        Ok(created)
    }

    async fn update_item_metadata(
        &self,
        id: ItemId,
        metadata: ItemMetadata,
    ) -> Result<Item, StoreError> {
        let mut state = self.write()?;
        let stored = state.items.remove(&id).ok_or(StoreError::NotFound(id))?;
        let updated = stored.with_metadata(metadata, Utc::now());
        state.items.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.items.remove(&id).ok_or(StoreError::NotFound(id))?;
        state.movements.remove(&id);
        Ok(())
    }

    async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StoreError> {
        ensure_ids(ids)?;
        let mut state = self.write()?;
        let mut deleted = 0;
        for id in ids {
            if state.items.remove(id).is_some() {
                state.movements.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let state = self.read()?;
        let mut history = state.movements.get(&item_id).cloned().unwrap_or_default();
        history.reverse();
        Ok(history)
    }
}
