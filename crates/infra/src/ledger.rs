//! Inventory ledger: every balance change goes through here.
//!
//! The free functions work inside an open store transaction so coordinators (handover
//! approval, spares fulfillment) can combine ledger calls with their own state change.
//! [`InventoryLedger`] wraps each of them in a transaction of its own.

use chrono::{DateTime, Utc};
use tracing::instrument;

use toolroom_core::{AggregateRoot, DomainError, ExpectedVersion, InventoryItemId, StockTransactionId};
use toolroom_events::execute;
use toolroom_inventory::{
    InventoryCommand, InventoryItem, InventoryKey, Reconciliation, RecordMovement, RegisterItem,
    StockLevels, StockMovement, StockReference, StockTransaction, TransactionType, UpdateLevels,
    reconcile,
};

use crate::error::ServiceResult;
use crate::services::ServiceContext;
use crate::store::{Tables, UnitOfWork};

/// Result of one ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOutcome {
    pub item: InventoryItem,
    /// `None` when the call was a replay of an already recorded movement.
    pub transaction: Option<StockTransaction>,
}

pub(crate) fn register_item(
    tables: &mut Tables,
    key: InventoryKey,
    name: &str,
    levels: StockLevels,
    at: DateTime<Utc>,
) -> ServiceResult<InventoryItem> {
    if tables.inventory_item_by_key(&key).is_some() {
        return Err(DomainError::conflict(format!("an inventory item already exists for {key}")).into());
    }

    let item_id = InventoryItemId::new();
    let mut item = InventoryItem::empty(item_id);
    let cmd = InventoryCommand::RegisterItem(RegisterItem {
        item_id,
        key,
        name: name.to_string(),
        levels,
        occurred_at: at,
    });
    let events = execute(&mut item, &cmd)?;
    tables.commit_inventory_item(item.clone(), ExpectedVersion::Exact(0), &events)?;
    Ok(item)
}

/// Look the key up, registering a zero-stock item when nothing matches.
pub(crate) fn find_or_register(
    tables: &mut Tables,
    key: InventoryKey,
    name: &str,
    levels: StockLevels,
    at: DateTime<Utc>,
) -> ServiceResult<InventoryItem> {
    if let Some(item) = tables.inventory_item_by_key(&key) {
        return Ok(item.clone());
    }
    tracing::info!(key = %key, "registering inventory item on first receipt");
    register_item(tables, key, name, levels, at)
}

/// Apply one movement and append its ledger row.
///
/// A reference whose idempotency key was already recorded is a replay: the item is
/// returned unchanged and no row is written.
pub(crate) fn record_movement(
    tables: &mut Tables,
    item_id: InventoryItemId,
    movement: StockMovement,
    reference: StockReference,
    at: DateTime<Utc>,
) -> ServiceResult<StockOutcome> {
    let mut item = tables.inventory_item(item_id)?.clone();

    if let Some(key) = reference.idempotency_key() {
        if tables.has_ledger_key(&key) {
            tracing::info!(
                item_id = %item_id,
                reference_type = %key.reference_type,
                reference_id = %key.reference_id,
                reference_line = %key.reference_line,
                "stock movement already recorded; skipping replay"
            );
            return Ok(StockOutcome {
                item,
                transaction: None,
            });
        }
    }

    let base = item.version();
    let cmd = InventoryCommand::RecordMovement(RecordMovement {
        item_id,
        transaction_id: StockTransactionId::new(),
        movement,
        reference,
        occurred_at: at,
    });
    let events = execute(&mut item, &cmd)?;
    tables.commit_inventory_item(item.clone(), ExpectedVersion::Exact(base), &events)?;

    let transaction = events.into_iter().find_map(|ev| match ev {
        toolroom_inventory::InventoryEvent::StockRecorded(txn) => Some(txn),
        _ => None,
    });
    Ok(StockOutcome { item, transaction })
}

/// Inventory service: registration, stock movements, thresholds and reconciliation.
pub struct InventoryLedger<S> {
    ctx: ServiceContext<S>,
}

impl<S> InventoryLedger<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, key, name), fields(key = %key), err)]
    pub fn register_item(
        &self,
        key: InventoryKey,
        name: &str,
        levels: StockLevels,
    ) -> ServiceResult<InventoryItem> {
        let at = self.ctx.clock.now();
        let item = self
            .ctx
            .store
            .write(|tables| register_item(tables, key, name, levels, at))?;
        tracing::info!(item_id = %item.id_typed(), "inventory item registered");
        Ok(item)
    }

    /// Existing item for `key`, or a new zero-stock item with the configured minimum.
    #[instrument(skip(self, key, name), fields(key = %key), err)]
    pub fn find_or_register(&self, key: InventoryKey, name: &str) -> ServiceResult<InventoryItem> {
        let at = self.ctx.clock.now();
        let levels = StockLevels::new(self.ctx.config.default_min_stock_level, None)?;
        self.ctx
            .store
            .write(|tables| find_or_register(tables, key, name, levels, at))
    }

    #[instrument(skip(self, reference), err)]
    pub fn add_stock(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        reference: StockReference,
    ) -> ServiceResult<StockOutcome> {
        self.apply(item_id, StockMovement::Add(quantity), reference)
    }

    #[instrument(skip(self, reference), err)]
    pub fn remove_stock(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        reference: StockReference,
    ) -> ServiceResult<StockOutcome> {
        self.apply(item_id, StockMovement::Remove(quantity), reference)
    }

    /// `Addition`/`Removal` move by `quantity`; `Adjustment` sets the counted balance.
    #[instrument(skip(self, reference), err)]
    pub fn adjust_stock(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        transaction_type: TransactionType,
        reference: StockReference,
    ) -> ServiceResult<StockOutcome> {
        self.apply(item_id, StockMovement::from_adjustment(transaction_type, quantity), reference)
    }

    fn apply(
        &self,
        item_id: InventoryItemId,
        movement: StockMovement,
        reference: StockReference,
    ) -> ServiceResult<StockOutcome> {
        let at = self.ctx.clock.now();
        let outcome = self
            .ctx
            .store
            .write(|tables| record_movement(tables, item_id, movement, reference, at))?;

        if let Some(txn) = &outcome.transaction {
            tracing::info!(
                item_id = %item_id,
                transaction_type = ?txn.transaction_type,
                quantity = txn.quantity,
                balance_after = txn.balance_after,
                "stock movement recorded"
            );
            self.ctx.notify_low_stock([&outcome.item]);
        }
        Ok(outcome)
    }

    /// Change min/max levels. Recomputes the status; no ledger row.
    #[instrument(skip(self), err)]
    pub fn update_thresholds(
        &self,
        item_id: InventoryItemId,
        levels: StockLevels,
    ) -> ServiceResult<InventoryItem> {
        let at = self.ctx.clock.now();
        let item = self.ctx.store.write(|tables| {
            let mut item = tables.inventory_item(item_id)?.clone();
            let base = item.version();
            let cmd = InventoryCommand::UpdateLevels(UpdateLevels {
                item_id,
                levels,
                occurred_at: at,
            });
            let events = execute(&mut item, &cmd)?;
            tables.commit_inventory_item(item.clone(), ExpectedVersion::Exact(base), &events)?;
            Ok(item)
        })?;
        self.ctx.notify_low_stock([&item]);
        Ok(item)
    }

    pub fn get(&self, item_id: InventoryItemId) -> ServiceResult<InventoryItem> {
        self.ctx
            .store
            .read(|tables| Ok(tables.inventory_item(item_id)?.clone()))
    }

    pub fn find_by_key(&self, key: &InventoryKey) -> ServiceResult<Option<InventoryItem>> {
        self.ctx
            .store
            .read(|tables| Ok(tables.inventory_item_by_key(key).cloned()))
    }

    /// Ledger rows of one item in creation order.
    pub fn transactions(&self, item_id: InventoryItemId) -> ServiceResult<Vec<StockTransaction>> {
        self.ctx.store.read(|tables| {
            tables.inventory_item(item_id)?;
            Ok(tables.transactions_for(item_id))
        })
    }

    /// Compare the stored balance against a replay of the item's ledger.
    #[instrument(skip(self), err)]
    pub fn reconcile(&self, item_id: InventoryItemId) -> ServiceResult<Reconciliation> {
        let report = self.ctx.store.read(|tables| {
            let item = tables.inventory_item(item_id)?;
            Ok(reconcile(
                item_id,
                item.current_stock(),
                &tables.transactions_for(item_id),
            ))
        })?;
        if !report.is_balanced() {
            tracing::warn!(
                item_id = %item_id,
                stored = report.stored_balance,
                replayed = report.replayed_balance,
                "inventory ledger does not reconcile"
            );
        }
        Ok(report)
    }
}
