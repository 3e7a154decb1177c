//! Postgres-backed item store.
//!
//! Reference DDL lives in `migrations/0001_inventory.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction won |
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate id on insert |
//! | Database (check constraint violation) | `23514` | `Persistence` | Negative stock or zero `pieces_per_box` reached the table |
//! | Database (other) | Any other | `Persistence` | Other database errors |
//! | PoolClosed / Io / Tls / ... | N/A | `Persistence` | Connectivity |
//!
//! ## Concurrency
//!
//! `commit_movement` updates the item row with
//! `WHERE id = $1 AND version = $expected` and inserts the movement in the same
//! transaction. A concurrent writer that committed first has already bumped
//! `version`, so the update matches zero rows and the commit fails with
//! `Conflict` instead of overwriting the other writer's stock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use stockroom_core::{ExpectedVersion, ItemId, MovementId, Versioned};
use stockroom_inventory::{
    Item, ItemMetadata, Movement, MovementKind, NewItem, PiecesPerBox, Stock, StockDelta,
};

use super::r#trait::{ItemStore, StoreError, ensure_ids, validate_commit};
use crate::config::StockroomConfig;

const ITEM_COLUMNS: &str = "id, name, category, boxes, pieces, total_pieces, pieces_per_box, \
                            created_at, updated_at, version";

const MOVEMENT_COLUMNS: &str = "id, item_id, kind, quantity_boxes, quantity_pieces, \
                                pieces_affected, previous_stock, new_stock, recorded_at";

/// Postgres-backed item store.
///
/// Uses the SQLx connection pool (thread-safe, `Send + Sync`). Every write
/// that touches more than one row runs inside an explicit transaction.
#[derive(Debug, Clone)]
pub struct PostgresItemStore {
    pool: Arc<PgPool>,
}

impl PostgresItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `config.database_url`.
    pub async fn connect(config: &StockroomConfig) -> Result<Self, StoreError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Persistence("DATABASE_URL is not configured".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    async fn insert_item(
        tx: &mut Transaction<'_, Postgres>,
        item: &Item,
    ) -> Result<(), StoreError> {
        let stock = item.stock();
        sqlx::query(
            r#"
            INSERT INTO items (
                id, name, category, boxes, pieces, total_pieces, pieces_per_box,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(item.name())
        .bind(item.category())
        .bind(to_db("boxes", stock.boxes)?)
        .bind(to_db("pieces", stock.pieces)?)
        .bind(to_db("total_pieces", stock.total_pieces)?)
        .bind(i64::from(item.pieces_per_box().get()))
        .bind(item.created_at())
        .bind(item.updated_at())
        .bind(to_db("version", item.version())?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PostgresItemStore {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.map(|r| item_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(item_count = tracing::field::Empty), err)]
    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        Span::current().record("item_count", rows.len());
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(
        skip(self, item, movement),
        fields(
            item_id = %item.id(),
            movement_id = %movement.id,
            expected_version = ?expected_version
        ),
        err
    )]
    async fn commit_movement(
        &self,
        item: &Item,
        movement: &Movement,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        validate_commit(item, movement)?;

        let expected = expected_version
            .as_option()
            .map(|v| to_db("version", v))
            .transpose()?;
        let stock = item.stock();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE items
            SET boxes = $2,
                pieces = $3,
                total_pieces = $4,
                updated_at = $5,
                version = $6
            WHERE id = $1
              AND ($7::bigint IS NULL OR version = $7)
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(to_db("boxes", stock.boxes)?)
        .bind(to_db("pieces", stock.pieces)?)
        .bind(to_db("total_pieces", stock.total_pieces)?)
        .bind(item.updated_at())
        .bind(to_db("version", item.version())?)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_item_stock", e))?;

        if updated.rows_affected() == 0 {
            let current: Option<i64> = sqlx::query_scalar("SELECT version FROM items WHERE id = $1")
                .bind(item.id().as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_item_version", e))?;

            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;

            return Err(match current {
                None => StoreError::NotFound(*item.id()),
                Some(found) => StoreError::Conflict(format!(
                    "item {}: expected {expected_version:?}, found {found}",
                    item.id()
                )),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO item_movements (
                id, item_id, kind, quantity_boxes, quantity_pieces,
                pieces_affected, previous_stock, new_stock, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement.kind.as_str())
        .bind(to_db("quantity_boxes", movement.quantity.boxes)?)
        .bind(to_db("quantity_pieces", movement.quantity.pieces)?)
        .bind(movement.pieces_affected)
        .bind(&movement.previous_stock)
        .bind(&movement.new_stock)
        .bind(movement.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, new_item), fields(item_id = tracing::field::Empty), err)]
    async fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError> {
        let item = Item::create(new_item, Utc::now());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Self::insert_item(&mut tx, &item).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("item_id", tracing::field::display(item.id()));
        Ok(item)
    }

    #[instrument(skip(self, new_items), fields(batch_size = new_items.len()), err)]
    async fn bulk_create_items(&self, new_items: Vec<NewItem>) -> Result<Vec<Item>, StoreError> {
        let now = Utc::now();
        let items: Vec<Item> = new_items
            .into_iter()
            .map(|new_item| Item::create(new_item, now))
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for item in &items {
            if let Err(err) = Self::insert_item(&mut tx, item).await {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(items)
    }

    #[instrument(skip(self, metadata), fields(item_id = %id), err)]
    async fn update_item_metadata(
        &self,
        id: ItemId,
        metadata: ItemMetadata,
    ) -> Result<Item, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE items
            SET name = $2, category = $3, updated_at = $4
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(metadata.name())
        .bind(metadata.category())
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item_metadata", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        // item_movements rows go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(
        skip(self, ids),
        fields(requested = ids.len(), deleted = tracing::field::Empty),
        err
    )]
    async fn delete_items(&self, ids: &[ItemId]) -> Result<u64, StoreError> {
        ensure_ids(ids)?;
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let result = sqlx::query("DELETE FROM items WHERE id = ANY($1)")
            .bind(&uuids)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_items", e))?;

        Span::current().record("deleted", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn list_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM item_movements \
             WHERE item_id = $1 ORDER BY recorded_at DESC, id DESC"
        ))
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter()
            .map(|row| -> Result<Movement, StoreError> {
                MovementRow::from_row(row)
                    .map_err(|e| StoreError::Persistence(format!("failed to read movement row: {e}")))?
                    .try_into()
            })
            .collect()
    }
}

fn to_db(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidRequest(format!("{column} out of range: {value}")))
}

fn from_db(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Persistence(format!("corrupt row: negative {column} ({value})")))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    ItemRow::from_row(row)
        .map_err(|e| StoreError::Persistence(format!("failed to read item row: {e}")))?
        .try_into()
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Persistence(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Persistence(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    name: String,
    category: String,
    boxes: i64,
    pieces: i64,
    total_pieces: i64,
    pieces_per_box: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            boxes: row.try_get("boxes")?,
            pieces: row.try_get("pieces")?,
            total_pieces: row.try_get("total_pieces")?,
            pieces_per_box: row.try_get("pieces_per_box")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let corrupt = |e: stockroom_core::DomainError| {
            StoreError::Persistence(format!("corrupt item row {}: {e}", row.id))
        };
        let metadata = ItemMetadata::new(row.name.clone(), row.category.clone()).map_err(corrupt)?;
        let pieces_per_box = PiecesPerBox::from_signed(row.pieces_per_box).map_err(corrupt)?;

        Ok(Item::restore(
            ItemId::from_uuid(row.id),
            metadata,
            Stock {
                boxes: from_db("boxes", row.boxes)?,
                pieces: from_db("pieces", row.pieces)?,
                total_pieces: from_db("total_pieces", row.total_pieces)?,
            },
            pieces_per_box,
            row.created_at,
            row.updated_at,
            from_db("version", row.version)?,
        ))
    }
}

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    item_id: Uuid,
    kind: String,
    quantity_boxes: i64,
    quantity_pieces: i64,
    pieces_affected: i64,
    previous_stock: String,
    new_stock: String,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            kind: row.try_get("kind")?,
            quantity_boxes: row.try_get("quantity_boxes")?,
            quantity_pieces: row.try_get("quantity_pieces")?,
            pieces_affected: row.try_get("pieces_affected")?,
            previous_stock: row.try_get("previous_stock")?,
            new_stock: row.try_get("new_stock")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind: MovementKind = row.kind.parse().map_err(|e| {
            StoreError::Persistence(format!("corrupt movement row {}: {e}", row.id))
        })?;

        Ok(Movement {
            id: MovementId::from_uuid(row.id),
            item_id: ItemId::from_uuid(row.item_id),
            kind,
            quantity: StockDelta::new(
                from_db("quantity_boxes", row.quantity_boxes)?,
                from_db("quantity_pieces", row.quantity_pieces)?,
            ),
            pieces_affected: row.pieces_affected,
            previous_stock: row.previous_stock,
            new_stock: row.new_stock,
            recorded_at: row.recorded_at,
        })
    }
}
