use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ItemId, ValueObject, Versioned};

/// Conversion factor used when an item is created without an explicit one.
pub const DEFAULT_PIECES_PER_BOX: u32 = 24;

/// Largest conversion factor accepted (storage uses a signed 32-bit range).
pub const MAX_PIECES_PER_BOX: u32 = i32::MAX as u32;

/// Number of pieces in one box. Always positive; fixed when the item is created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PiecesPerBox(u32);

impl PiecesPerBox {
    pub fn new(value: u32) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::invalid_request("pieces_per_box must be positive"));
        }
        if value > MAX_PIECES_PER_BOX {
            return Err(DomainError::invalid_request(format!(
                "pieces_per_box cannot exceed {MAX_PIECES_PER_BOX}"
            )));
        }
        Ok(Self(value))
    }

    /// Accept a signed value as it arrives from a request payload or a database row.
    pub fn from_signed(value: i64) -> DomainResult<Self> {
        let value = u32::try_from(value).map_err(|_| {
            DomainError::invalid_request(format!("pieces_per_box out of range: {value}"))
        })?;
        Self::new(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PiecesPerBox {
    fn default() -> Self {
        Self(DEFAULT_PIECES_PER_BOX)
    }
}

impl TryFrom<u32> for PiecesPerBox {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PiecesPerBox> for u32 {
    fn from(value: PiecesPerBox) -> Self {
        value.0
    }
}

impl core::fmt::Display for PiecesPerBox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ValueObject for PiecesPerBox {}

/// Stock held for one item.
///
/// `total_pieces` is tracked on its own rather than recomputed from
/// `boxes * pieces_per_box + pieces`; see [`crate::ledger::ClampPolicy`] for
/// when the two can disagree.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stock {
    pub boxes: u64,
    pub pieces: u64,
    pub total_pieces: u64,
}

impl Stock {
    pub const EMPTY: Stock = Stock {
        boxes: 0,
        pieces: 0,
        total_pieces: 0,
    };

    /// `boxes * pieces_per_box + pieces`, or `None` on overflow.
    pub fn derived_total(&self, pieces_per_box: PiecesPerBox) -> Option<u64> {
        self.boxes
            .checked_mul(u64::from(pieces_per_box.get()))?
            .checked_add(self.pieces)
    }

    /// Whether `total_pieces` still agrees with the box and piece channels.
    pub fn is_consistent(&self, pieces_per_box: PiecesPerBox) -> bool {
        self.derived_total(pieces_per_box) == Some(self.total_pieces)
    }
}

/// Display form recorded on movement snapshots.
impl core::fmt::Display for Stock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} boxes & {} pieces", self.boxes, self.pieces)
    }
}

impl ValueObject for Stock {}

/// Editable descriptive fields of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MetadataRecord")]
pub struct ItemMetadata {
    name: String,
    category: String,
}

#[derive(Deserialize)]
struct MetadataRecord {
    name: String,
    #[serde(default)]
    category: String,
}

impl TryFrom<MetadataRecord> for ItemMetadata {
    type Error = DomainError;

    fn try_from(record: MetadataRecord) -> Result<Self, Self::Error> {
        Self::new(record.name, record.category)
    }
}

impl ItemMetadata {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::invalid_request("name cannot be empty"));
        }
        Ok(Self {
            name,
            category: category.into().trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// A validated item that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub metadata: ItemMetadata,
    pub pieces_per_box: PiecesPerBox,
}

impl NewItem {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        pieces_per_box: Option<PiecesPerBox>,
    ) -> DomainResult<Self> {
        Ok(Self {
            metadata: ItemMetadata::new(name, category)?,
            pieces_per_box: pieces_per_box.unwrap_or_default(),
        })
    }

    /// Validate a draft, falling back to `default_pieces_per_box` when the
    /// draft leaves the conversion factor out.
    pub fn from_draft(draft: ItemDraft, default_pieces_per_box: PiecesPerBox) -> DomainResult<Self> {
        let pieces_per_box = match draft.pieces_per_box {
            Some(v) => PiecesPerBox::from_signed(v)?,
            None => default_pieces_per_box,
        };
        Self::new(draft.name, draft.category, Some(pieces_per_box))
    }
}

impl TryFrom<ItemDraft> for NewItem {
    type Error = DomainError;

    fn try_from(draft: ItemDraft) -> Result<Self, Self::Error> {
        Self::from_draft(draft, PiecesPerBox::default())
    }
}

/// Unvalidated item payload as supplied by a caller (single add, bulk add, edit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    #[serde(alias = "item_name")]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub pieces_per_box: Option<i64>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            pieces_per_box: None,
        }
    }

    pub fn with_pieces_per_box(mut self, pieces_per_box: i64) -> Self {
        self.pieces_per_box = Some(pieces_per_box);
        self
    }

    /// The editable part of the draft. `pieces_per_box` is ignored: it is
    /// fixed once an item exists.
    pub fn metadata(&self) -> DomainResult<ItemMetadata> {
        ItemMetadata::new(self.name.clone(), self.category.clone())
    }
}

/// Inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    #[serde(flatten)]
    metadata: ItemMetadata,
    #[serde(flatten)]
    stock: Stock,
    pieces_per_box: PiecesPerBox,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Item {
    /// A freshly created item: empty stock, revision 0.
    pub fn create(new_item: NewItem, now: DateTime<Utc>) -> Self {
        Self {
            id: ItemId::new(),
            metadata: new_item.metadata,
            stock: Stock::EMPTY,
            pieces_per_box: new_item.pieces_per_box,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Rebuild an item from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ItemId,
        metadata: ItemMetadata,
        stock: Stock,
        pieces_per_box: PiecesPerBox,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            metadata,
            stock,
            pieces_per_box,
            created_at,
            updated_at,
            version,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn category(&self) -> &str {
        self.metadata.category()
    }

    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    pub fn stock(&self) -> Stock {
        self.stock
    }

    pub fn pieces_per_box(&self) -> PiecesPerBox {
        self.pieces_per_box
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replace name and category. Stock and revision are left alone.
    pub fn with_metadata(mut self, metadata: ItemMetadata, now: DateTime<Utc>) -> Self {
        self.metadata = metadata;
        self.updated_at = now;
        self
    }

    /// Take over the stock-side fields of `committed` (stock, revision, update time).
    pub fn with_committed_stock(mut self, committed: &Item) -> Self {
        self.stock = committed.stock;
        self.version = committed.version;
        self.updated_at = committed.updated_at;
        self
    }

    pub(crate) fn next_stock(&self, stock: Stock, now: DateTime<Utc>) -> Self {
        Self {
            stock,
            updated_at: now,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

impl Versioned for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
