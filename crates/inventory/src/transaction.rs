//! The append-only stock transaction log and its reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolroom_core::{InventoryItemId, StockTransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Addition,
    Removal,
    Adjustment,
}

/// What caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    Handover,
    SparesRequest,
    Manual,
}

impl core::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReferenceType::Handover => "Handover",
            ReferenceType::SparesRequest => "SparesRequest",
            ReferenceType::Manual => "Manual",
        };
        f.write_str(s)
    }
}

/// Provenance attached to every ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReference {
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    /// Line within the referenced document (e.g. the PR item a handover credit is for).
    pub reference_line: Option<String>,
    pub performed_by: UserId,
    pub notes: Option<String>,
}

impl StockReference {
    pub fn manual(performed_by: UserId) -> Self {
        Self {
            reference_type: ReferenceType::Manual,
            reference_id: None,
            reference_line: None,
            performed_by,
            notes: None,
        }
    }

    pub fn document(
        reference_type: ReferenceType,
        reference_id: impl ToString,
        performed_by: UserId,
    ) -> Self {
        Self {
            reference_type,
            reference_id: Some(reference_id.to_string()),
            reference_line: None,
            performed_by,
            notes: None,
        }
    }

    pub fn with_line(mut self, line: impl ToString) -> Self {
        self.reference_line = Some(line.to_string());
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// `(type, document, line)` when the reference pins one specific document line.
    ///
    /// Two ledger calls with the same key are the same credit/debit; the second one is
    /// a replay and must not move stock again.
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        match (&self.reference_id, &self.reference_line) {
            (Some(id), Some(line)) => Some(IdempotencyKey {
                reference_type: self.reference_type,
                reference_id: id.clone(),
                reference_line: line.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub reference_line: String,
}

/// One immutable row of the stock ledger.
///
/// `quantity` is a positive magnitude for `Addition`/`Removal` and the signed delta
/// for `Adjustment`; use [`StockTransaction::signed_quantity`] when replaying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: StockTransactionId,
    pub item_id: InventoryItemId,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub balance_after: i64,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub reference_line: Option<String>,
    pub performed_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    pub fn signed_quantity(&self) -> i64 {
        match self.transaction_type {
            TransactionType::Addition => self.quantity,
            TransactionType::Removal => -self.quantity,
            TransactionType::Adjustment => self.quantity,
        }
    }

    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        match (&self.reference_id, &self.reference_line) {
            (Some(id), Some(line)) => Some(IdempotencyKey {
                reference_type: self.reference_type,
                reference_id: id.clone(),
                reference_line: line.clone(),
            }),
            _ => None,
        }
    }
}

/// Sum of signed quantities, in log order.
pub fn replay<'a>(transactions: impl IntoIterator<Item = &'a StockTransaction>) -> i64 {
    transactions.into_iter().map(StockTransaction::signed_quantity).sum()
}

/// Result of checking an item's balance against its transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub item_id: InventoryItemId,
    pub stored_balance: i64,
    pub replayed_balance: i64,
    pub transaction_count: usize,
    /// First transaction whose `balance_after` disagrees with the running sum.
    pub first_divergence: Option<StockTransactionId>,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.stored_balance == self.replayed_balance && self.first_divergence.is_none()
    }
}

pub fn reconcile(
    item_id: InventoryItemId,
    stored_balance: i64,
    transactions: &[StockTransaction],
) -> Reconciliation {
    let mut running = 0i64;
    let mut first_divergence = None;
    for txn in transactions {
        running += txn.signed_quantity();
        if first_divergence.is_none() && txn.balance_after != running {
            first_divergence = Some(txn.id);
        }
    }

    Reconciliation {
        item_id,
        stored_balance,
        replayed_balance: running,
        transaction_count: transactions.len(),
        first_divergence,
    }
}
