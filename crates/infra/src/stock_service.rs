//! Stock service.
//!
//! Composes the pure ledger in `stockroom-inventory` with an [`ItemStore`]:
//! read the item, compute the movement, commit it guarded by the revision that
//! was read. A commit that loses the race to a concurrent writer is re-read and
//! recomputed up to `max_conflict_retries` times before `Conflict` surfaces.
//!
//! This module contains no IO itself; it composes the store trait.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{Span, info, instrument, warn};

use stockroom_core::{DomainError, ExpectedVersion, ItemId, MovementId, Versioned};
use stockroom_inventory::{
    Item, ItemDraft, Movement, MovementKind, MovementRequest, NewItem, PiecesPerBox, StockDelta,
    StockLedger, catalog,
};

use crate::config::StockroomConfig;
use crate::item_store::{ItemStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// The referenced item does not exist.
    #[error("item not found")]
    NotFound,
    /// Malformed or degenerate input; nothing was written.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Concurrent writers kept winning the revision check; nothing was written.
    #[error("concurrent modification: {0}")]
    Conflict(String),
    /// The store failed; the unit of work was rolled back.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidRequest(msg) => StockError::InvalidRequest(msg),
            DomainError::InvalidId(msg) => StockError::InvalidRequest(msg),
            DomainError::NotFound => StockError::NotFound,
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(_) => StockError::NotFound,
            StoreError::Conflict(msg) => StockError::Conflict(msg),
            StoreError::InvalidRequest(msg) => StockError::InvalidRequest(msg),
            StoreError::Persistence(msg) => StockError::PersistenceFailure(msg),
        }
    }
}

/// Result of a committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementOutcome {
    /// Item state as committed.
    pub item: Item,
    pub movement: Movement,
    pub requested: StockDelta,
    pub applied: StockDelta,
    /// Boxes, pieces or `total_pieces` hit zero before the requested quantity
    /// was removed.
    pub clamped: bool,
}

/// Application-facing inventory operations over an [`ItemStore`].
#[derive(Debug, Clone)]
pub struct StockService<S> {
    store: S,
    ledger: StockLedger,
    default_pieces_per_box: PiecesPerBox,
    max_conflict_retries: u32,
}

impl<S: ItemStore> StockService<S> {
    /// Service with default ledger policy, default conversion factor and three
    /// conflict retries.
    pub fn new(store: S) -> Self {
        Self::from_config(store, &StockroomConfig::default())
    }

    pub fn from_config(store: S, config: &StockroomConfig) -> Self {
        Self {
            store,
            ledger: StockLedger::new(config.clamp_policy),
            default_pieces_per_box: config.default_pieces_per_box,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate, compute and commit one movement.
    #[instrument(
        skip(self, request),
        fields(item_id = %request.item_id, direction = %request.direction, attempts = tracing::field::Empty),
        err
    )]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<MovementOutcome, StockError> {
        let delta = request.delta()?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let item = self.load(request.item_id).await?;
            let applied = self.ledger.apply(
                &item,
                request.direction,
                delta,
                MovementId::new(),
                Utc::now(),
            )?;

            match self
                .store
                .commit_movement(
                    &applied.item,
                    &applied.movement,
                    ExpectedVersion::Exact(item.version()),
                )
                .await
            {
                Ok(()) => {
                    Span::current().record("attempts", attempt);
                    let clamped = applied.was_clamped();
                    if clamped {
                        warn!(
                            requested_boxes = %applied.requested.boxes,
                            requested_pieces = %applied.requested.pieces,
                            applied_boxes = %applied.applied.boxes,
                            applied_pieces = %applied.applied.pieces,
                            total_clamped = applied.total_clamped,
                            pieces_affected = applied.movement.pieces_affected,
                            "pull-out clamped at zero"
                        );
                    }
                    info!(
                        movement_id = %applied.movement.id,
                        previous = %applied.movement.previous_stock,
                        new = %applied.movement.new_stock,
                        pieces_affected = applied.movement.pieces_affected,
                        "movement committed"
                    );
                    return Ok(MovementOutcome {
                        clamped,
                        item: applied.item,
                        movement: applied.movement,
                        requested: applied.requested,
                        applied: applied.applied,
                    });
                }
                Err(StoreError::Conflict(msg)) if attempt <= self.max_conflict_retries => {
                    warn!(attempt, reason = %msg, "revision conflict; retrying movement");
                }
                Err(err) => {
                    Span::current().record("attempts", attempt);
                    return Err(err.into());
                }
            }
        }
    }

    pub async fn pull_in(
        &self,
        item_id: ItemId,
        boxes: Option<i64>,
        pieces: Option<i64>,
    ) -> Result<MovementOutcome, StockError> {
        self.apply_movement(request(item_id, MovementKind::PullIn, boxes, pieces))
            .await
    }

    pub async fn pull_out(
        &self,
        item_id: ItemId,
        boxes: Option<i64>,
        pieces: Option<i64>,
    ) -> Result<MovementOutcome, StockError> {
        self.apply_movement(request(item_id, MovementKind::PullOut, boxes, pieces))
            .await
    }

    /// Create one item with empty stock.
    #[instrument(skip(self, draft), fields(name = %draft.name), err)]
    pub async fn add_item(&self, draft: ItemDraft) -> Result<Item, StockError> {
        let new_item = NewItem::from_draft(draft, self.default_pieces_per_box)?;
        let item = self.store.create_item(new_item).await?;
        info!(item_id = %item.id(), "item created");
        Ok(item)
    }

    /// Create a batch of items. Every draft is validated before anything is
    /// written, and the store persists all of them or none.
    #[instrument(skip(self, drafts), fields(count = drafts.len()), err)]
    pub async fn bulk_add_items(&self, drafts: Vec<ItemDraft>) -> Result<Vec<Item>, StockError> {
        if drafts.is_empty() {
            return Err(StockError::InvalidRequest("no items provided".to_string()));
        }

        let new_items = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                NewItem::from_draft(draft, self.default_pieces_per_box)
                    .map_err(|err| at_index(index, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let items = self.store.bulk_create_items(new_items).await?;
        info!(created = items.len(), "items created");
        Ok(items)
    }

    /// Replace an item's name and category. Stock and conversion factor are
    /// not editable here.
    #[instrument(skip(self, draft), fields(item_id = %id), err)]
    pub async fn edit_item(&self, id: ItemId, draft: ItemDraft) -> Result<Item, StockError> {
        let metadata = draft.metadata()?;
        Ok(self.store.update_item_metadata(id, metadata).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_item(&self, id: ItemId) -> Result<(), StockError> {
        self.store.delete_item(id).await?;
        info!("item deleted");
        Ok(())
    }

    /// Delete every listed item that exists; returns how many were removed.
    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    pub async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StockError> {
        let deleted = self.store.delete_items(ids).await?;
        info!(deleted, "items deleted");
        Ok(deleted)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, StockError> {
        self.load(id).await
    }

    /// All items, newest first.
    pub async fn list_items(&self) -> Result<Vec<Item>, StockError> {
        Ok(self.store.list_items().await?)
    }

    /// Items whose name or category contains `term`, alphabetically.
    pub async fn search_items(&self, term: &str) -> Result<Vec<Item>, StockError> {
        Ok(catalog::search(self.store.list_items().await?, term))
    }

    /// Movement history of an existing item, newest first.
    pub async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StockError> {
        self.load(item_id).await?;
        Ok(self.store.list_movements(item_id).await?)
    }

    async fn load(&self, id: ItemId) -> Result<Item, StockError> {
        self.store.get_item(id).await?.ok_or(StockError::NotFound)
    }
}

fn request(
    item_id: ItemId,
    direction: MovementKind,
    boxes: Option<i64>,
    pieces: Option<i64>,
) -> MovementRequest {
    MovementRequest {
        item_id,
        direction,
        boxes,
        pieces,
    }
}

fn at_index(index: usize, err: DomainError) -> StockError {
    match StockError::from(err) {
        StockError::InvalidRequest(msg) => StockError::InvalidRequest(format!("item {index}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use stockroom_inventory::{ClampPolicy, ItemMetadata, Stock};

    use crate::item_store::InMemoryItemStore;

    fn service() -> StockService<InMemoryItemStore> {
        StockService::new(InMemoryItemStore::new())
    }

    fn stock(boxes: u64, pieces: u64, total_pieces: u64) -> Stock {
        Stock {
            boxes,
            pieces,
            total_pieces,
        }
    }

    #[tokio::test]
    async fn pull_in_then_clamped_pull_out() {
        let svc = service();
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        assert_eq!(item.stock(), Stock::EMPTY);
        assert_eq!(item.pieces_per_box().get(), 24);

        let first = svc.pull_in(item.id_typed(), Some(6), Some(4)).await.unwrap();
        assert_eq!(first.item.stock(), stock(6, 4, 148));

        let second = svc.pull_in(item.id_typed(), Some(2), Some(10)).await.unwrap();
        assert_eq!(second.item.stock(), stock(8, 14, 206));
        assert_eq!(second.movement.pieces_affected, 58);
        assert_eq!(second.movement.previous_stock, "6 boxes & 4 pieces");
        assert_eq!(second.movement.new_stock, "8 boxes & 14 pieces");

        let third = svc.pull_out(item.id_typed(), Some(100), Some(2)).await.unwrap();
        assert!(third.clamped);
        assert_eq!(third.applied, StockDelta::new(8, 2));
        assert_eq!(third.movement.pieces_affected, -206);

        let stored = svc.get_item(item.id_typed()).await.unwrap();
        assert_eq!(stored.stock(), stock(0, 12, 0));
        assert_eq!(stored.version(), 3);

        let history = svc.list_movements(item.id_typed()).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MovementKind::PullOut, MovementKind::PullIn, MovementKind::PullIn]
        );
    }

    #[tokio::test]
    async fn pull_out_after_total_hits_zero_is_reported_clamped() {
        let svc = service();
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        svc.pull_in(item.id_typed(), Some(8), Some(14)).await.unwrap();
        svc.pull_out(item.id_typed(), Some(100), Some(2)).await.unwrap();

        let out = svc.pull_out(item.id_typed(), None, Some(5)).await.unwrap();
        assert_eq!(out.item.stock(), stock(0, 7, 0));
        assert_eq!(out.applied, out.requested);
        assert!(out.clamped);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["clamped"], true);
    }

    #[tokio::test]
    async fn each_movement_gets_its_own_id() {
        let svc = service();
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        let first = svc.pull_in(item.id_typed(), Some(1), None).await.unwrap();
        let second = svc.pull_in(item.id_typed(), Some(1), None).await.unwrap();
        assert_ne!(first.movement.id, second.movement.id);
    }

    #[tokio::test]
    async fn derived_policy_from_config() {
        let config = StockroomConfig {
            clamp_policy: ClampPolicy::Derived,
            ..StockroomConfig::default()
        };
        let svc = StockService::from_config(InMemoryItemStore::new(), &config);
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();

        svc.pull_in(item.id_typed(), Some(8), Some(14)).await.unwrap();
        let out = svc.pull_out(item.id_typed(), Some(100), Some(2)).await.unwrap();
        assert_eq!(out.item.stock(), stock(0, 12, 12));
    }

    #[tokio::test]
    async fn invalid_requests_write_nothing() {
        let svc = service();
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();

        for (boxes, pieces) in [(None, None), (Some(0), Some(0)), (Some(-1), None), (None, Some(-3))] {
            let err = svc.pull_in(item.id_typed(), boxes, pieces).await.unwrap_err();
            assert!(matches!(err, StockError::InvalidRequest(_)), "{boxes:?}/{pieces:?}");
        }
        assert!(svc.list_movements(item.id_typed()).await.unwrap().is_empty());
        assert_eq!(svc.get_item(item.id_typed()).await.unwrap().version(), 0);
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let svc = service();
        let missing = ItemId::new();
        assert_eq!(
            svc.pull_out(missing, Some(1), None).await.unwrap_err(),
            StockError::NotFound
        );
        assert_eq!(svc.get_item(missing).await.unwrap_err(), StockError::NotFound);
        assert_eq!(svc.list_movements(missing).await.unwrap_err(), StockError::NotFound);
        assert_eq!(svc.delete_item(missing).await.unwrap_err(), StockError::NotFound);
        assert_eq!(
            svc.edit_item(missing, ItemDraft::new("X", "Y")).await.unwrap_err(),
            StockError::NotFound
        );
    }

    #[tokio::test]
    async fn bulk_add_rejects_whole_batch_on_any_invalid_draft() {
        let svc = service();
        let drafts = vec![
            ItemDraft::new("Bolt", "Fasteners"),
            ItemDraft::new("Nut", "Fasteners"),
            ItemDraft::new("  ", "Fasteners"),
            ItemDraft::new("Washer", "Fasteners").with_pieces_per_box(0),
            ItemDraft::new("Screw", "Fasteners"),
        ];

        let err = svc.bulk_add_items(drafts).await.unwrap_err();
        assert_eq!(
            err,
            StockError::InvalidRequest("item 2: name cannot be empty".to_string())
        );
        assert!(svc.list_items().await.unwrap().is_empty());

        assert!(matches!(
            svc.bulk_add_items(Vec::new()).await.unwrap_err(),
            StockError::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn bulk_add_store_failure_persists_nothing() {
        let svc = StockService::new(InMemoryItemStore::with_item_limit(3));
        let drafts = (0..5)
            .map(|i| ItemDraft::new(format!("Item {i}"), "Misc"))
            .collect();

        let err = svc.bulk_add_items(drafts).await.unwrap_err();
        assert!(matches!(err, StockError::PersistenceFailure(_)));
        assert!(svc.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_add_applies_per_item_conversion_factor() {
        let svc = service();
        let items = svc
            .bulk_add_items(vec![
                ItemDraft::new("Bolt", "Fasteners").with_pieces_per_box(100),
                ItemDraft::new("Nut", "Fasteners"),
            ])
            .await
            .unwrap();
        assert_eq!(items[0].pieces_per_box().get(), 100);
        assert_eq!(items[1].pieces_per_box().get(), 24);
    }

    #[tokio::test]
    async fn edit_leaves_stock_untouched() {
        let svc = service();
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        svc.pull_in(item.id_typed(), Some(3), None).await.unwrap();

        let edited = svc
            .edit_item(item.id_typed(), ItemDraft::new("Hex Bolt M8", "Hardware"))
            .await
            .unwrap();
        assert_eq!(edited.name(), "Hex Bolt M8");
        assert_eq!(edited.category(), "Hardware");
        assert_eq!(edited.stock(), stock(3, 0, 72));
        assert_eq!(edited.version(), 1);
    }

    #[tokio::test]
    async fn search_matches_name_or_category() {
        let svc = service();
        svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        svc.add_item(ItemDraft::new("Copper Wire", "Electrical")).await.unwrap();
        svc.add_item(ItemDraft::new("Anchor", "fasteners")).await.unwrap();

        let found = svc.search_items("FASTEN").await.unwrap();
        let names: Vec<_> = found.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["Anchor", "Hex Bolt"]);
    }

    #[tokio::test]
    async fn delete_items_reports_count() {
        let svc = service();
        let a = svc.add_item(ItemDraft::new("A", "X")).await.unwrap();
        let b = svc.add_item(ItemDraft::new("B", "X")).await.unwrap();

        let deleted = svc.delete_items(&[a.id_typed(), b.id_typed(), ItemId::new()]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(matches!(
            svc.delete_items(&[]).await.unwrap_err(),
            StockError::InvalidRequest(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pull_ins_are_not_lost() {
        let config = StockroomConfig {
            max_conflict_retries: 100,
            ..StockroomConfig::default()
        };
        let svc = Arc::new(StockService::from_config(
            Arc::new(InMemoryItemStore::new()),
            &config,
        ));
        let item = svc.add_item(ItemDraft::new("Hex Bolt", "Fasteners")).await.unwrap();
        let id = item.id_typed();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.pull_in(id, Some(1), Some(1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = svc.get_item(id).await.unwrap();
        assert_eq!(stored.stock(), stock(20, 20, 20 * 25));
        assert_eq!(stored.version(), 20);
        assert_eq!(svc.list_movements(id).await.unwrap().len(), 20);
    }

    /// Serves one fixed snapshot for every read, so each commit sees a stale
    /// revision once the real item has moved on.
    struct FrozenReads {
        inner: Arc<InMemoryItemStore>,
        snapshot: Item,
        commits: AtomicU32,
    }

    #[async_trait]
    impl ItemStore for FrozenReads {
        async fn get_item(&self, _id: ItemId) -> Result<Option<Item>, StoreError> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list_items().await
        }

        async fn commit_movement(
            &self,
            item: &Item,
            movement: &Movement,
            expected_version: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit_movement(item, movement, expected_version).await
        }

        async fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError> {
            self.inner.create_item(new_item).await
        }

        async fn bulk_create_items(&self, new_items: Vec<NewItem>) -> Result<Vec<Item>, StoreError> {
            self.inner.bulk_create_items(new_items).await
        }

        async fn update_item_metadata(
            &self,
            id: ItemId,
            metadata: ItemMetadata,
        ) -> Result<Item, StoreError> {
            self.inner.update_item_metadata(id, metadata).await
        }

        async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
            self.inner.delete_item(id).await
        }

        async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StoreError> {
            self.inner.delete_items(ids).await
        }

        async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
            self.inner.list_movements(item_id).await
        }
    }

    #[tokio::test]
    async fn conflict_surfaces_after_retries_are_exhausted() {
        let inner = Arc::new(InMemoryItemStore::new());
        let snapshot = inner
            .create_item(NewItem::new("Hex Bolt", "Fasteners", None).unwrap())
            .await
            .unwrap();
        StockService::new(Arc::clone(&inner))
            .pull_in(snapshot.id_typed(), Some(1), None)
            .await
            .unwrap();

        let config = StockroomConfig {
            max_conflict_retries: 2,
            ..StockroomConfig::default()
        };
        let svc = StockService::from_config(
            FrozenReads {
                inner,
                snapshot: snapshot.clone(),
                commits: AtomicU32::new(0),
            },
            &config,
        );

        let err = svc.pull_in(snapshot.id_typed(), Some(5), None).await.unwrap_err();
        assert!(matches!(err, StockError::Conflict(_)));
        assert_eq!(svc.store().commits.load(Ordering::SeqCst), 3);

        let history = svc.store().inner.list_movements(snapshot.id_typed()).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
