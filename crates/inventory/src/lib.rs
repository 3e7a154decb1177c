//! Inventory domain: items, stock movements and the stock ledger.
//!
//! Domain logic only: no IO, no storage. The ledger is deterministic; callers
//! pass the movement id and the current time in and persist what comes out.
//! New items get a fresh UUIDv7 id in [`Item::create`].

pub mod catalog;
pub mod item;
pub mod ledger;
pub mod movement;

pub use item::{
    DEFAULT_PIECES_PER_BOX, Item, ItemDraft, ItemMetadata, MAX_PIECES_PER_BOX, NewItem, PiecesPerBox,
    Stock,
};
pub use ledger::{AppliedMovement, ClampPolicy, StockLedger, apply_movement};
pub use movement::{Movement, MovementKind, MovementRequest, StockDelta};
