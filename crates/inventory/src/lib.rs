//! Inventory domain module.
//!
//! Items keyed by `(part_number, tool_number, item_code?)` and the append-only stock
//! ledger that explains every balance change. Pure domain logic: no IO, no storage.

pub mod item;
pub mod transaction;

pub use item::{
    InventoryCommand, InventoryEvent, InventoryItem, InventoryKey, ItemRegistered, LevelsUpdated,
    RecordMovement, RegisterItem, StockLevels, StockMovement, StockStatus, UpdateLevels,
};
pub use transaction::{
    IdempotencyKey, Reconciliation, ReferenceType, StockReference, StockTransaction,
    TransactionType, reconcile, replay,
};
