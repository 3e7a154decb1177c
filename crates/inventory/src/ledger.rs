//! Stock ledger: computes the next stock state of an item for a movement.
//!
//! The ledger is a pure function of `(item, direction, quantity, movement id,
//! now)`. It reads nothing and writes nothing, not even the clock; the caller
//! supplies the id and timestamp and persists the updated item and the movement
//! record together.
//!
//! ## Accounting rules
//!
//! - Pull-in adds to both channels and adds the piece equivalent
//!   (`boxes * pieces_per_box + pieces`) to `total_pieces`.
//! - Pull-out subtracts per channel and clamps each result at zero
//!   independently. Over-withdrawal succeeds with a truncated effect;
//!   [`AppliedMovement::was_clamped`] reports it.
//!
//! Because `total_pieces` is clamped separately from the box and piece
//! channels, a pull-out straddling a clamp leaves `total_pieces` different from
//! `boxes * pieces_per_box + pieces`. That drift is the historical behaviour
//! and stays the default ([`ClampPolicy::PerChannel`]).
//! [`ClampPolicy::Derived`] is the opt-in fix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, MovementId, Versioned};

use crate::item::{Item, PiecesPerBox, Stock};
use crate::movement::{Movement, MovementKind, StockDelta};

/// Largest count any stock channel may hold (storage uses signed 64-bit columns).
pub const STOCK_LIMIT: u64 = i64::MAX as u64;

/// How `total_pieces` is maintained.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClampPolicy {
    /// `total_pieces` is adjusted by the requested piece equivalent and
    /// clamped on its own. Can drift from the channels after a clamp.
    #[default]
    PerChannel,
    /// `total_pieces` is recomputed from the channels after every movement.
    /// Changes the historical accounting; never drifts.
    Derived,
}

impl core::str::FromStr for ClampPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-channel" | "per_channel" => Ok(ClampPolicy::PerChannel),
            "derived" => Ok(ClampPolicy::Derived),
            other => Err(DomainError::invalid_request(format!(
                "unknown clamp policy: {other}"
            ))),
        }
    }
}

/// Outcome of a ledger computation: the next item state plus its audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMovement {
    pub item: Item,
    pub movement: Movement,
    /// Quantity the caller asked for.
    pub requested: StockDelta,
    /// Quantity the box and piece channels actually changed by.
    pub applied: StockDelta,
    /// `total_pieces` reached zero before the requested piece equivalent was
    /// removed.
    pub total_clamped: bool,
}

impl AppliedMovement {
    /// True when any of boxes, pieces or `total_pieces` was clamped at zero.
    pub fn was_clamped(&self) -> bool {
        self.requested != self.applied || self.total_clamped
    }
}

/// Stock ledger with a fixed clamp policy.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StockLedger {
    policy: ClampPolicy,
}

impl StockLedger {
    pub fn new(policy: ClampPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ClampPolicy {
        self.policy
    }

    /// Compute the item state after moving `delta` in `direction`.
    ///
    /// Errors with `InvalidRequest` when the delta is empty or a pull-in would
    /// push a channel past [`STOCK_LIMIT`].
    pub fn apply(
        &self,
        item: &Item,
        direction: MovementKind,
        delta: StockDelta,
        movement_id: MovementId,
        now: DateTime<Utc>,
    ) -> DomainResult<AppliedMovement> {
        if delta.is_empty() {
            return Err(DomainError::invalid_request("nothing to move"));
        }

        let pieces_per_box = item.pieces_per_box();
        let before = item.stock();
        let after = match direction {
            MovementKind::PullIn => self.pull_in(before, delta, pieces_per_box)?,
            MovementKind::PullOut => self.pull_out(before, delta, pieces_per_box)?,
        };

        let applied = StockDelta {
            boxes: before.boxes.abs_diff(after.boxes),
            pieces: before.pieces.abs_diff(after.pieces),
        };
        let total_clamped = match (direction, self.policy) {
            (MovementKind::PullOut, ClampPolicy::PerChannel) => delta
                .piece_equivalent(pieces_per_box)
                .is_none_or(|removed| removed > before.total_pieces),
            _ => false,
        };
        let pieces_affected =
            i64::try_from(i128::from(after.total_pieces) - i128::from(before.total_pieces))
                .map_err(|_| overflow())?;

        let updated = item.next_stock(after, now);
        let movement = Movement {
            id: movement_id,
            item_id: *updated.id(),
            kind: direction,
            quantity: delta,
            pieces_affected,
            previous_stock: before.to_string(),
            new_stock: after.to_string(),
            recorded_at: now,
        };

        Ok(AppliedMovement {
            item: updated,
            movement,
            requested: delta,
            applied,
            total_clamped,
        })
    }

    fn pull_in(
        &self,
        before: Stock,
        delta: StockDelta,
        pieces_per_box: PiecesPerBox,
    ) -> DomainResult<Stock> {
        let boxes = within_limit(before.boxes.checked_add(delta.boxes))?;
        let pieces = within_limit(before.pieces.checked_add(delta.pieces))?;
        let total_pieces = match self.policy {
            ClampPolicy::PerChannel => within_limit(
                delta
                    .piece_equivalent(pieces_per_box)
                    .and_then(|added| before.total_pieces.checked_add(added)),
            )?,
            ClampPolicy::Derived => derived_total(boxes, pieces, pieces_per_box)?,
        };
        Ok(Stock {
            boxes,
            pieces,
            total_pieces,
        })
    }

    fn pull_out(
        &self,
        before: Stock,
        delta: StockDelta,
        pieces_per_box: PiecesPerBox,
    ) -> DomainResult<Stock> {
        let boxes = before.boxes.saturating_sub(delta.boxes);
        let pieces = before.pieces.saturating_sub(delta.pieces);
        let total_pieces = match self.policy {
            // An overflowing piece equivalent exceeds any stored total: clamps to zero.
            ClampPolicy::PerChannel => before
                .total_pieces
                .saturating_sub(delta.piece_equivalent(pieces_per_box).unwrap_or(u64::MAX)),
            ClampPolicy::Derived => derived_total(boxes, pieces, pieces_per_box)?,
        };
        Ok(Stock {
            boxes,
            pieces,
            total_pieces,
        })
    }
}

/// Apply a movement with the default [`ClampPolicy::PerChannel`] accounting.
pub fn apply_movement(
    item: &Item,
    direction: MovementKind,
    delta: StockDelta,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> DomainResult<AppliedMovement> {
    StockLedger::default().apply(item, direction, delta, movement_id, now)
}

fn derived_total(boxes: u64, pieces: u64, pieces_per_box: PiecesPerBox) -> DomainResult<u64> {
    let stock = Stock {
        boxes,
        pieces,
        total_pieces: 0,
    };
    within_limit(stock.derived_total(pieces_per_box))
}

fn within_limit(value: Option<u64>) -> DomainResult<u64> {
    value.filter(|v| *v <= STOCK_LIMIT).ok_or_else(overflow)
}

fn overflow() -> DomainError {
    DomainError::invalid_request("stock overflow")
}
