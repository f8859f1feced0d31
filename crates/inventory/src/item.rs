use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolroom_core::{
    Aggregate, AggregateRoot, DomainError, InventoryItemId, StockTransactionId, ValueObject,
};
use toolroom_events::Event;

use crate::transaction::{StockReference, StockTransaction, TransactionType};

/// Derived stock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// `OutOfStock` at or below zero, `LowStock` strictly between zero and the minimum,
    /// `InStock` otherwise.
    pub fn derive(current_stock: i64, min_stock_level: i64) -> Self {
        if current_stock <= 0 {
            StockStatus::OutOfStock
        } else if current_stock < min_stock_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Uniqueness key of an inventory item: `(part_number, tool_number, item_code?)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub part_number: String,
    pub tool_number: String,
    pub item_code: Option<String>,
}

impl ValueObject for InventoryKey {}

impl InventoryKey {
    /// Build a key with surrounding whitespace trimmed and blank item codes dropped.
    pub fn new(
        part_number: impl AsRef<str>,
        tool_number: impl AsRef<str>,
        item_code: Option<impl AsRef<str>>,
    ) -> Result<Self, DomainError> {
        let part_number = part_number.as_ref().trim().to_string();
        let tool_number = tool_number.as_ref().trim().to_string();
        if part_number.is_empty() {
            return Err(DomainError::bad_request("part number is required"));
        }
        if tool_number.is_empty() {
            return Err(DomainError::bad_request("tool number is required"));
        }
        let item_code = item_code
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(Self {
            part_number,
            tool_number,
            item_code,
        })
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.part_number, self.tool_number)?;
        if let Some(code) = &self.item_code {
            write!(f, "/{code}")?;
        }
        Ok(())
    }
}

/// Stock thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub min_stock_level: i64,
    pub max_stock_level: Option<i64>,
}

impl ValueObject for StockLevels {}

impl StockLevels {
    pub fn new(min_stock_level: i64, max_stock_level: Option<i64>) -> Result<Self, DomainError> {
        if min_stock_level < 0 {
            return Err(DomainError::bad_request("minimum stock level cannot be negative"));
        }
        if let Some(max) = max_stock_level {
            if max < min_stock_level {
                return Err(DomainError::bad_request(
                    "maximum stock level cannot be below the minimum",
                ));
            }
        }
        Ok(Self {
            min_stock_level,
            max_stock_level,
        })
    }
}

/// Requested change to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMovement {
    /// Credit `n` units.
    Add(i64),
    /// Debit `n` units; never below zero.
    Remove(i64),
    /// Stock take: the counted balance replaces the current one.
    Count(i64),
}

impl StockMovement {
    /// Map an `adjust_stock(qty, type)` call onto a movement.
    pub fn from_adjustment(transaction_type: TransactionType, quantity: i64) -> Self {
        match transaction_type {
            TransactionType::Addition => StockMovement::Add(quantity),
            TransactionType::Removal => StockMovement::Remove(quantity),
            TransactionType::Adjustment => StockMovement::Count(quantity),
        }
    }
}

/// Aggregate root: InventoryItem.
///
/// The balance only changes through `StockRecorded` events, each of which carries the
/// ledger row that is appended to the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    key: Option<InventoryKey>,
    name: String,
    current_stock: i64,
    levels: StockLevels,
    status: StockStatus,
    last_restocked_at: Option<DateTime<Utc>>,
    last_restocked_quantity: Option<i64>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-registered instance.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            key: None,
            name: String::new(),
            current_stock: 0,
            levels: StockLevels {
                min_stock_level: 0,
                max_stock_level: None,
            },
            status: StockStatus::OutOfStock,
            last_restocked_at: None,
            last_restocked_quantity: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn key(&self) -> Option<&InventoryKey> {
        self.key.as_ref()
    }

    pub fn part_number(&self) -> &str {
        self.key.as_ref().map(|k| k.part_number.as_str()).unwrap_or_default()
    }

    pub fn tool_number(&self) -> &str {
        self.key.as_ref().map(|k| k.tool_number.as_str()).unwrap_or_default()
    }

    pub fn item_code(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| k.item_code.as_deref())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn last_restocked_at(&self) -> Option<DateTime<Utc>> {
        self.last_restocked_at
    }

    pub fn last_restocked_quantity(&self) -> Option<i64> {
        self.last_restocked_quantity
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: InventoryItemId,
    pub key: InventoryKey,
    pub name: String,
    pub levels: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (add, remove or count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub item_id: InventoryItemId,
    pub transaction_id: StockTransactionId,
    pub movement: StockMovement,
    pub reference: StockReference,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLevels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLevels {
    pub item_id: InventoryItemId,
    pub levels: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    RecordMovement(RecordMovement),
    UpdateLevels(UpdateLevels),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: InventoryItemId,
    pub key: InventoryKey,
    pub name: String,
    pub levels: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LevelsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelsUpdated {
    pub item_id: InventoryItemId,
    pub levels: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    /// Carries the ledger row to append.
    StockRecorded(StockTransaction),
    LevelsUpdated(LevelsUpdated),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::StockRecorded(_) => "inventory.item.stock_recorded",
            InventoryEvent::LevelsUpdated(_) => "inventory.item.levels_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::StockRecorded(t) => t.created_at,
            InventoryEvent::LevelsUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.key = Some(e.key.clone());
                self.name = e.name.clone();
                self.levels = e.levels;
                self.current_stock = 0;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            InventoryEvent::StockRecorded(t) => {
                self.current_stock = t.balance_after;
                if t.transaction_type == TransactionType::Addition {
                    self.last_restocked_at = Some(t.created_at);
                    self.last_restocked_quantity = Some(t.quantity);
                }
                self.updated_at = Some(t.created_at);
            }
            InventoryEvent::LevelsUpdated(e) => {
                self.levels = e.levels;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.status = StockStatus::derive(self.current_stock, self.levels.min_stock_level);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            InventoryCommand::UpdateLevels(cmd) => self.handle_levels(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_registered(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {}", self.id)));
        }
        Ok(())
    }

    fn ensure_item_id(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::bad_request("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "inventory item {} already exists",
                self.id
            )));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::bad_request("item name cannot be empty"));
        }

        Ok(vec![InventoryEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            key: cmd.key.clone(),
            name: cmd.name.trim().to_string(),
            levels: cmd.levels,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_item_id(cmd.item_id)?;

        let current = self.current_stock;
        let (transaction_type, quantity, balance_after) = match cmd.movement {
            StockMovement::Add(qty) => {
                if qty <= 0 {
                    return Err(DomainError::bad_request("quantity must be positive"));
                }
                let balance = current
                    .checked_add(qty)
                    .ok_or_else(|| DomainError::bad_request("stock balance overflow"))?;
                (TransactionType::Addition, qty, balance)
            }
            StockMovement::Remove(qty) => {
                if qty <= 0 {
                    return Err(DomainError::bad_request("quantity must be positive"));
                }
                if qty > current {
                    return Err(DomainError::bad_request(format!(
                        "Insufficient stock: requested {qty}, available {current}"
                    )));
                }
                (TransactionType::Removal, qty, current - qty)
            }
            StockMovement::Count(counted) => {
                if counted < 0 {
                    return Err(DomainError::bad_request("counted stock cannot be negative"));
                }
                if counted == current {
                    return Err(DomainError::bad_request(format!(
                        "adjustment does not change stock (already {current})"
                    )));
                }
                (TransactionType::Adjustment, counted - current, counted)
            }
        };

        Ok(vec![InventoryEvent::StockRecorded(StockTransaction {
            id: cmd.transaction_id,
            item_id: cmd.item_id,
            transaction_type,
            quantity,
            balance_after,
            reference_type: cmd.reference.reference_type,
            reference_id: cmd.reference.reference_id.clone(),
            reference_line: cmd.reference.reference_line.clone(),
            performed_by: cmd.reference.performed_by,
            notes: cmd.reference.notes.clone(),
            created_at: cmd.occurred_at,
        })])
    }

    fn handle_levels(&self, cmd: &UpdateLevels) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_item_id(cmd.item_id)?;

        Ok(vec![InventoryEvent::LevelsUpdated(LevelsUpdated {
            item_id: cmd.item_id,
            levels: cmd.levels,
            occurred_at: cmd.occurred_at,
        })])
    }
}
