//! Transactional storage for the workflow documents, inventory and ledger.
//!
//! Every engine operation runs inside one [`UnitOfWork::write`] call. The closure sees
//! the whole [`Tables`] set; an `Err` from the closure discards everything it changed.

pub mod in_memory;

pub use in_memory::InMemoryStore;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use toolroom_core::{
    AggregateRoot, DocumentNumber, DomainError, ExpectedVersion, HandoverId, InventoryItemId,
    ProjectId, PurchaseRequisitionId, QuotationId, SparesRequestId, SupplierId,
};
use toolroom_events::{Event, EventEnvelope};
use toolroom_handover::{HandoverEvent, ToolHandover};
use toolroom_inventory::{
    IdempotencyKey, InventoryEvent, InventoryItem, InventoryKey, StockTransaction,
};
use toolroom_purchasing::{PurchaseRequisition, Quotation, QuotationEvent, RequisitionEvent};
use toolroom_spares::{SparesEvent, SparesRequest};

use crate::error::ServiceResult;

/// A transactional view over [`Tables`].
pub trait UnitOfWork: Send + Sync {
    /// Run `f` against a consistent snapshot.
    fn read<T>(&self, f: impl FnOnce(&Tables) -> ServiceResult<T>) -> ServiceResult<T>;

    /// Run `f` in an isolated write transaction; commit only when it returns `Ok`.
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> ServiceResult<T>) -> ServiceResult<T>;
}

impl<S> UnitOfWork for Arc<S>
where
    S: UnitOfWork + ?Sized,
{
    fn read<T>(&self, f: impl FnOnce(&Tables) -> ServiceResult<T>) -> ServiceResult<T> {
        (**self).read(f)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> ServiceResult<T>) -> ServiceResult<T> {
        (**self).write(f)
    }
}

/// Project reference data. Managed outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub code: String,
    pub name: String,
}

/// Supplier reference data. Managed outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    /// 1–5 when rated.
    pub rating: Option<u8>,
}

pub const REQUISITION: &str = "PurchaseRequisition";
pub const QUOTATION: &str = "Quotation";
pub const HANDOVER: &str = "ToolHandover";
pub const INVENTORY_ITEM: &str = "InventoryItem";
pub const SPARES_REQUEST: &str = "SparesRequest";

/// Every table the engine persists.
///
/// Secondary indexes (`*_order`, `*_by_pr`, `inventory_keys`, `ledger_keys`) are kept
/// in step by the `commit_*` and `index_*` helpers.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub(crate) projects: HashMap<ProjectId, Project>,
    pub(crate) suppliers: HashMap<SupplierId, Supplier>,

    pub(crate) requisitions: HashMap<PurchaseRequisitionId, PurchaseRequisition>,
    pub(crate) requisition_order: Vec<PurchaseRequisitionId>,

    pub(crate) quotations: HashMap<QuotationId, Quotation>,
    pub(crate) quotations_by_pr: HashMap<PurchaseRequisitionId, Vec<QuotationId>>,

    pub(crate) handovers: HashMap<HandoverId, ToolHandover>,
    pub(crate) handovers_by_pr: HashMap<PurchaseRequisitionId, Vec<HandoverId>>,

    pub(crate) inventory: HashMap<InventoryItemId, InventoryItem>,
    pub(crate) inventory_keys: HashMap<InventoryKey, InventoryItemId>,
    pub(crate) stock_transactions: Vec<StockTransaction>,
    pub(crate) ledger_keys: HashSet<IdempotencyKey>,

    pub(crate) spares_requests: HashMap<SparesRequestId, SparesRequest>,
    pub(crate) spares_order: Vec<SparesRequestId>,

    pub(crate) issued_numbers: HashSet<String>,
    pub(crate) audit: Vec<EventEnvelope<JsonValue>>,
}

impl Tables {
    // -- reference data -------------------------------------------------------------

    pub fn upsert_project(&mut self, project: Project) {
        self.projects.insert(project.id, project);
    }

    pub fn upsert_supplier(&mut self, supplier: Supplier) {
        self.suppliers.insert(supplier.id, supplier);
    }

    pub fn project(&self, id: ProjectId) -> Result<&Project, DomainError> {
        self.projects
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("project {id}")))
    }

    pub fn supplier(&self, id: SupplierId) -> Result<&Supplier, DomainError> {
        self.suppliers
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("supplier {id}")))
    }

    // -- lookups ----------------------------------------------------------------------

    pub fn requisition(&self, id: PurchaseRequisitionId) -> Result<&PurchaseRequisition, DomainError> {
        self.requisitions
            .get(&id)
            .filter(|pr| pr.is_created())
            .ok_or_else(|| DomainError::not_found(format!("purchase requisition {id}")))
    }

    /// Requisitions in creation order.
    pub fn requisitions(&self) -> impl Iterator<Item = &PurchaseRequisition> {
        self.requisition_order
            .iter()
            .filter_map(|id| self.requisitions.get(id))
            .filter(|pr| pr.is_created())
    }

    pub fn quotation(&self, id: QuotationId) -> Result<&Quotation, DomainError> {
        self.quotations
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("quotation {id}")))
    }

    /// Quotations of `pr_id` in creation order.
    pub fn quotations_for(&self, pr_id: PurchaseRequisitionId) -> impl Iterator<Item = &Quotation> {
        self.quotations_by_pr
            .get(&pr_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.quotations.get(id))
    }

    pub fn handover(&self, id: HandoverId) -> Result<&ToolHandover, DomainError> {
        self.handovers
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("handover {id}")))
    }

    pub fn handovers_for(&self, pr_id: PurchaseRequisitionId) -> impl Iterator<Item = &ToolHandover> {
        self.handovers_by_pr
            .get(&pr_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.handovers.get(id))
    }

    pub fn inventory_item(&self, id: InventoryItemId) -> Result<&InventoryItem, DomainError> {
        self.inventory
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("inventory item {id}")))
    }

    pub fn inventory_item_by_key(&self, key: &InventoryKey) -> Option<&InventoryItem> {
        self.inventory_keys
            .get(key)
            .and_then(|id| self.inventory.get(id))
    }

    /// Ledger rows of one item in the order they were appended.
    pub fn transactions_for(&self, item_id: InventoryItemId) -> Vec<StockTransaction> {
        self.stock_transactions
            .iter()
            .filter(|t| t.item_id == item_id)
            .cloned()
            .collect()
    }

    pub fn has_ledger_key(&self, key: &IdempotencyKey) -> bool {
        self.ledger_keys.contains(key)
    }

    pub fn spares_request(&self, id: SparesRequestId) -> Result<&SparesRequest, DomainError> {
        self.spares_requests
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("spares request {id}")))
    }

    /// Spares requests in creation order.
    pub fn spares_requests(&self) -> impl Iterator<Item = &SparesRequest> {
        self.spares_order
            .iter()
            .filter_map(|id| self.spares_requests.get(id))
    }

    /// Audit trail of every committed domain event.
    pub fn audit(&self) -> &[EventEnvelope<JsonValue>] {
        &self.audit
    }

    // -- writes -----------------------------------------------------------------------

    /// Reserve a document number; numbers are unique across every document kind.
    pub(crate) fn claim_number(&mut self, number: &DocumentNumber) -> Result<(), DomainError> {
        if !self.issued_numbers.insert(number.to_string()) {
            return Err(DomainError::conflict(format!(
                "document number {number} is already in use"
            )));
        }
        Ok(())
    }

    pub(crate) fn commit_requisition(
        &mut self,
        pr: PurchaseRequisition,
        expected: ExpectedVersion,
        events: &[RequisitionEvent],
    ) -> ServiceResult<()> {
        let id = pr.id_typed();
        if !self.requisitions.contains_key(&id) {
            self.requisition_order.push(id);
        }
        commit(&mut self.requisitions, &mut self.audit, REQUISITION, id, pr, expected, events)
    }

    /// Drop a deleted requisition and everything it owns. The audit trail is kept.
    pub(crate) fn purge_requisition(&mut self, id: PurchaseRequisitionId) -> Vec<QuotationId> {
        self.requisitions.remove(&id);
        self.requisition_order.retain(|other| *other != id);
        let quotations = self.quotations_by_pr.remove(&id).unwrap_or_default();
        for quotation_id in &quotations {
            self.quotations.remove(quotation_id);
        }
        quotations
    }

    pub(crate) fn commit_quotation(
        &mut self,
        quotation: Quotation,
        expected: ExpectedVersion,
        events: &[QuotationEvent],
    ) -> ServiceResult<()> {
        let id = quotation.id_typed();
        if !self.quotations.contains_key(&id) {
            if let Some(pr_id) = quotation.pr_id() {
                self.quotations_by_pr.entry(pr_id).or_default().push(id);
            }
        }
        commit(&mut self.quotations, &mut self.audit, QUOTATION, id, quotation, expected, events)
    }

    pub(crate) fn commit_handover(
        &mut self,
        handover: ToolHandover,
        expected: ExpectedVersion,
        events: &[HandoverEvent],
    ) -> ServiceResult<()> {
        let id = handover.id_typed();
        if !self.handovers.contains_key(&id) {
            if let Some(pr_id) = handover.pr_id() {
                self.handovers_by_pr.entry(pr_id).or_default().push(id);
            }
        }
        commit(&mut self.handovers, &mut self.audit, HANDOVER, id, handover, expected, events)
    }

    pub(crate) fn commit_inventory_item(
        &mut self,
        item: InventoryItem,
        expected: ExpectedVersion,
        events: &[InventoryEvent],
    ) -> ServiceResult<()> {
        let id = item.id_typed();
        let key = item.key().cloned();
        if let Some(key) = &key {
            if self.inventory_keys.get(key).is_some_and(|existing| *existing != id) {
                return Err(DomainError::conflict(format!(
                    "an inventory item already exists for {key}"
                ))
                .into());
            }
        }

        commit(&mut self.inventory, &mut self.audit, INVENTORY_ITEM, id, item, expected, events)?;

        if let Some(key) = key {
            self.inventory_keys.insert(key, id);
        }
        for event in events {
            if let InventoryEvent::StockRecorded(txn) = event {
                if let Some(key) = txn.idempotency_key() {
                    self.ledger_keys.insert(key);
                }
                self.stock_transactions.push(txn.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn commit_spares_request(
        &mut self,
        request: SparesRequest,
        expected: ExpectedVersion,
        events: &[SparesEvent],
    ) -> ServiceResult<()> {
        let id = request.id_typed();
        if !self.spares_requests.contains_key(&id) {
            self.spares_order.push(id);
        }
        commit(&mut self.spares_requests, &mut self.audit, SPARES_REQUEST, id, request, expected, events)
    }
}

/// Optimistic save of one aggregate plus its audit envelopes.
///
/// `expected` is the version the aggregate had when it was loaded; envelopes are
/// numbered from there.
fn commit<K, A, E>(
    table: &mut HashMap<K, A>,
    audit: &mut Vec<EventEnvelope<JsonValue>>,
    aggregate_type: &str,
    key: K,
    aggregate: A,
    expected: ExpectedVersion,
    events: &[E],
) -> ServiceResult<()>
where
    K: Hash + Eq + core::fmt::Display,
    A: AggregateRoot,
    E: Event + Serialize,
{
    let stored = table.get(&key).map(|a| a.version()).unwrap_or(0);
    expected.check(stored)?;

    let mut envelopes = Vec::with_capacity(events.len());
    for (offset, event) in events.iter().enumerate() {
        envelopes.push(EventEnvelope::from_typed(
            key.to_string(),
            aggregate_type,
            stored + offset as u64 + 1,
            event,
        )?);
    }

    table.insert(key, aggregate);
    audit.extend(envelopes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use toolroom_core::{DocumentKind, StockTransactionId, UserId};
    use toolroom_events::execute;
    use toolroom_inventory::{
        InventoryCommand, RecordMovement, RegisterItem, StockLevels, StockMovement, StockReference,
    };

    fn registered(key: InventoryKey) -> (InventoryItem, Vec<InventoryEvent>) {
        let id = InventoryItemId::new();
        let mut item = InventoryItem::empty(id);
        let events = execute(
            &mut item,
            &InventoryCommand::RegisterItem(RegisterItem {
                item_id: id,
                key,
                name: "Punch".to_string(),
                levels: StockLevels::new(2, None).unwrap(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (item, events)
    }

    #[test]
    fn duplicate_document_numbers_conflict() {
        let mut tables = Tables::default();
        let number = DocumentNumber::first(DocumentKind::Handover, 2024).unwrap();
        tables.claim_number(&number).unwrap();
        let err = tables.claim_number(&number).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn stale_version_is_rejected() {
        let mut tables = Tables::default();
        let key = InventoryKey::new("P-1", "T-1", None::<&str>).unwrap();
        let (item, events) = registered(key);
        tables
            .commit_inventory_item(item.clone(), ExpectedVersion::Exact(0), &events)
            .unwrap();

        let err = tables
            .commit_inventory_item(item, ExpectedVersion::Exact(0), &[])
            .unwrap_err();
        assert_eq!(err.kind(), toolroom_core::ErrorKind::Conflict);
    }

    #[test]
    fn second_item_with_same_key_conflicts() {
        let mut tables = Tables::default();
        let key = InventoryKey::new("P-1", "T-1", Some("IC-9")).unwrap();
        let (first, events) = registered(key.clone());
        tables
            .commit_inventory_item(first, ExpectedVersion::Exact(0), &events)
            .unwrap();

        let (second, events) = registered(key);
        let err = tables
            .commit_inventory_item(second, ExpectedVersion::Exact(0), &events)
            .unwrap_err();
        assert_eq!(err.kind(), toolroom_core::ErrorKind::Conflict);
    }

    #[test]
    fn stock_rows_and_audit_are_appended_with_the_item() {
        let mut tables = Tables::default();
        let key = InventoryKey::new("P-1", "T-1", None::<&str>).unwrap();
        let (mut item, events) = registered(key);
        tables
            .commit_inventory_item(item.clone(), ExpectedVersion::Exact(0), &events)
            .unwrap();

        let base = item.version();
        let cmd = InventoryCommand::RecordMovement(RecordMovement {
            item_id: item.id_typed(),
            transaction_id: StockTransactionId::new(),
            movement: StockMovement::Add(4),
            reference: StockReference::document(
                toolroom_inventory::ReferenceType::Handover,
                "h-1",
                UserId::new(),
            )
            .with_line("line-1"),
            occurred_at: Utc::now(),
        });
        let events = execute(&mut item, &cmd).unwrap();
        tables
            .commit_inventory_item(item.clone(), ExpectedVersion::Exact(base), &events)
            .unwrap();

        let rows = tables.transactions_for(item.id_typed());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance_after, 4);
        assert!(tables.has_ledger_key(&rows[0].idempotency_key().unwrap()));

        let seqs: Vec<u64> = tables.audit().iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(tables.audit()[1].event_type(), "inventory.item.stock_recorded");
    }
}
