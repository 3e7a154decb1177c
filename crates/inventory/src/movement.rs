//! Stock movement records and movement requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ItemId, MovementId, ValueObject};

use crate::item::PiecesPerBox;

/// Direction of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    #[serde(alias = "in")]
    PullIn,
    #[serde(alias = "out")]
    PullOut,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::PullIn => "pull_in",
            MovementKind::PullOut => "pull_out",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_in" | "in" => Ok(MovementKind::PullIn),
            "pull_out" | "out" => Ok(MovementKind::PullOut),
            other => Err(DomainError::invalid_request(format!(
                "unknown movement kind: {other}"
            ))),
        }
    }
}

/// Quantity of a movement, in both units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockDelta {
    pub boxes: u64,
    pub pieces: u64,
}

impl StockDelta {
    pub fn new(boxes: u64, pieces: u64) -> Self {
        Self { boxes, pieces }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes == 0 && self.pieces == 0
    }

    /// `boxes * pieces_per_box + pieces`, or `None` on overflow.
    pub fn piece_equivalent(&self, pieces_per_box: PiecesPerBox) -> Option<u64> {
        self.boxes
            .checked_mul(u64::from(pieces_per_box.get()))?
            .checked_add(self.pieces)
    }
}

impl ValueObject for StockDelta {}

/// A caller's request to move stock for one item.
///
/// Quantities are optional and signed as they arrive; [`MovementRequest::delta`]
/// validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub direction: MovementKind,
    #[serde(default)]
    pub boxes: Option<i64>,
    #[serde(default)]
    pub pieces: Option<i64>,
}

impl MovementRequest {
    pub fn new(item_id: ItemId, direction: MovementKind) -> Self {
        Self {
            item_id,
            direction,
            boxes: None,
            pieces: None,
        }
    }

    pub fn pull_in(item_id: ItemId, boxes: i64, pieces: i64) -> Self {
        Self::new(item_id, MovementKind::PullIn).boxes(boxes).pieces(pieces)
    }

    pub fn pull_out(item_id: ItemId, boxes: i64, pieces: i64) -> Self {
        Self::new(item_id, MovementKind::PullOut).boxes(boxes).pieces(pieces)
    }

    pub fn boxes(mut self, boxes: i64) -> Self {
        self.boxes = Some(boxes);
        self
    }

    pub fn pieces(mut self, pieces: i64) -> Self {
        self.pieces = Some(pieces);
        self
    }

    /// Validated quantity. Missing fields count as zero.
    pub fn delta(&self) -> DomainResult<StockDelta> {
        let boxes = non_negative("boxes", self.boxes.unwrap_or(0))?;
        let pieces = non_negative("pieces", self.pieces.unwrap_or(0))?;
        let delta = StockDelta { boxes, pieces };
        if delta.is_empty() {
            return Err(DomainError::invalid_request("nothing to move"));
        }
        Ok(delta)
    }
}

fn non_negative(field: &str, value: i64) -> DomainResult<u64> {
    u64::try_from(value)
        .map_err(|_| DomainError::invalid_request(format!("{field} cannot be negative")))
}

/// Immutable audit record of one pull-in or pull-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub kind: MovementKind,
    /// Quantity as requested (before any clamping).
    pub quantity: StockDelta,
    /// Net change of `total_pieces` actually applied.
    pub pieces_affected: i64,
    pub previous_stock: String,
    pub new_stock: String,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
