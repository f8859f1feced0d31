use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolroom_core::{
    Aggregate, AggregateRoot, DocumentNumber, DomainError, InventoryItemId, ProjectId,
    SparesRequestId, UserId,
};
use toolroom_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparesRequestStatus {
    Pending,
    PartiallyFulfilled,
    Fulfilled,
    Rejected,
}

impl SparesRequestStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, SparesRequestStatus::Fulfilled | SparesRequestStatus::Rejected)
    }
}

impl core::fmt::Display for SparesRequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SparesRequestStatus::Pending => "Pending",
            SparesRequestStatus::PartiallyFulfilled => "PartiallyFulfilled",
            SparesRequestStatus::Fulfilled => "Fulfilled",
            SparesRequestStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// Copy of the inventory item's identifying fields taken at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub inventory_item_id: InventoryItemId,
    pub name: String,
    pub part_number: String,
    pub tool_number: String,
}

/// Aggregate root: SparesRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparesRequest {
    id: SparesRequestId,
    request_number: Option<DocumentNumber>,
    item: Option<RequestedItem>,
    quantity_requested: i64,
    quantity_fulfilled: i64,
    status: SparesRequestStatus,
    requested_by: Option<UserId>,
    project_id: Option<ProjectId>,
    purpose: Option<String>,
    fulfilled_by: Option<UserId>,
    fulfilled_at: Option<DateTime<Utc>>,
    fulfillment_notes: Option<String>,
    rejected_by: Option<UserId>,
    rejection_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SparesRequest {
    pub fn empty(id: SparesRequestId) -> Self {
        Self {
            id,
            request_number: None,
            item: None,
            quantity_requested: 0,
            quantity_fulfilled: 0,
            status: SparesRequestStatus::Pending,
            requested_by: None,
            project_id: None,
            purpose: None,
            fulfilled_by: None,
            fulfilled_at: None,
            fulfillment_notes: None,
            rejected_by: None,
            rejection_reason: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SparesRequestId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn request_number(&self) -> Option<&DocumentNumber> {
        self.request_number.as_ref()
    }

    pub fn item(&self) -> Option<&RequestedItem> {
        self.item.as_ref()
    }

    pub fn inventory_item_id(&self) -> Option<InventoryItemId> {
        self.item.as_ref().map(|i| i.inventory_item_id)
    }

    pub fn quantity_requested(&self) -> i64 {
        self.quantity_requested
    }

    pub fn quantity_fulfilled(&self) -> i64 {
        self.quantity_fulfilled
    }

    pub fn remaining(&self) -> i64 {
        self.quantity_requested - self.quantity_fulfilled
    }

    pub fn status(&self) -> SparesRequestStatus {
        self.status
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn fulfilled_by(&self) -> Option<UserId> {
        self.fulfilled_by
    }

    pub fn fulfilled_at(&self) -> Option<DateTime<Utc>> {
        self.fulfilled_at
    }

    pub fn fulfillment_notes(&self) -> Option<&str> {
        self.fulfillment_notes.as_deref()
    }

    pub fn rejected_by(&self) -> Option<UserId> {
        self.rejected_by
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl AggregateRoot for SparesRequest {
    type Id = SparesRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSparesRequest {
    pub request_id: SparesRequestId,
    pub request_number: DocumentNumber,
    pub item: RequestedItem,
    pub quantity_requested: i64,
    pub requested_by: UserId,
    pub project_id: Option<ProjectId>,
    pub purpose: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillSparesRequest.
///
/// `available_stock` is the item's balance read in the same transaction that will
/// debit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillSparesRequest {
    pub request_id: SparesRequestId,
    pub quantity: i64,
    pub available_stock: i64,
    pub fulfilled_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectSparesRequest {
    pub request_id: SparesRequestId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SparesCommand {
    Create(CreateSparesRequest),
    Fulfill(FulfillSparesRequest),
    Reject(RejectSparesRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparesRequested {
    pub request_id: SparesRequestId,
    pub request_number: DocumentNumber,
    pub item: RequestedItem,
    pub quantity_requested: i64,
    pub requested_by: UserId,
    pub project_id: Option<ProjectId>,
    pub purpose: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparesIssued {
    pub request_id: SparesRequestId,
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
    pub quantity_fulfilled: i64,
    pub status: SparesRequestStatus,
    pub fulfilled_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparesRequestRejected {
    pub request_id: SparesRequestId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SparesEvent {
    Requested(SparesRequested),
    Issued(SparesIssued),
    Rejected(SparesRequestRejected),
}

impl Event for SparesEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SparesEvent::Requested(_) => "spares.request.created",
            SparesEvent::Issued(_) => "spares.request.issued",
            SparesEvent::Rejected(_) => "spares.request.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SparesEvent::Requested(e) => e.occurred_at,
            SparesEvent::Issued(e) => e.occurred_at,
            SparesEvent::Rejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SparesRequest {
    type Command = SparesCommand;
    type Event = SparesEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SparesEvent::Requested(e) => {
                self.id = e.request_id;
                self.request_number = Some(e.request_number.clone());
                self.item = Some(e.item.clone());
                self.quantity_requested = e.quantity_requested;
                self.quantity_fulfilled = 0;
                self.status = SparesRequestStatus::Pending;
                self.requested_by = Some(e.requested_by);
                self.project_id = e.project_id;
                self.purpose = e.purpose.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SparesEvent::Issued(e) => {
                self.quantity_fulfilled = e.quantity_fulfilled;
                self.status = e.status;
                self.fulfilled_by = Some(e.fulfilled_by);
                self.fulfilled_at = Some(e.occurred_at);
                if e.notes.is_some() {
                    self.fulfillment_notes = e.notes.clone();
                }
            }
            SparesEvent::Rejected(e) => {
                self.status = SparesRequestStatus::Rejected;
                self.rejected_by = Some(e.rejected_by);
                self.rejection_reason = Some(e.reason.clone());
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SparesCommand::Create(cmd) => self.handle_create(cmd),
            SparesCommand::Fulfill(cmd) => self.handle_fulfill(cmd),
            SparesCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl SparesRequest {
    fn ensure_open(&self, request_id: SparesRequestId, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("spares request {}", self.id)));
        }
        if self.id != request_id {
            return Err(DomainError::bad_request("request_id mismatch"));
        }
        if self.status.is_closed() {
            return Err(DomainError::invalid_transition(
                action,
                "Pending or PartiallyFulfilled",
                self.status,
            ));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSparesRequest) -> Result<Vec<SparesEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "spares request {} already exists",
                self.id
            )));
        }
        if cmd.quantity_requested <= 0 {
            return Err(DomainError::bad_request("requested quantity must be positive"));
        }

        Ok(vec![SparesEvent::Requested(SparesRequested {
            request_id: cmd.request_id,
            request_number: cmd.request_number.clone(),
            item: cmd.item.clone(),
            quantity_requested: cmd.quantity_requested,
            requested_by: cmd.requested_by,
            project_id: cmd.project_id,
            purpose: cmd
                .purpose
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillSparesRequest) -> Result<Vec<SparesEvent>, DomainError> {
        self.ensure_open(cmd.request_id, "fulfill spares request")?;

        let remaining = self.remaining();
        if cmd.quantity <= 0 {
            return Err(DomainError::bad_request("quantity must be positive"));
        }
        if cmd.quantity > remaining {
            return Err(DomainError::bad_request(format!(
                "cannot fulfill {} units: only {remaining} remain on this request",
                cmd.quantity
            )));
        }
        if cmd.quantity > cmd.available_stock {
            return Err(DomainError::bad_request(format!(
                "Insufficient stock: requested {}, available {}",
                cmd.quantity, cmd.available_stock
            )));
        }

        let quantity_fulfilled = self.quantity_fulfilled + cmd.quantity;
        let status = if quantity_fulfilled == self.quantity_requested {
            SparesRequestStatus::Fulfilled
        } else {
            SparesRequestStatus::PartiallyFulfilled
        };
        let inventory_item_id = self
            .inventory_item_id()
            .ok_or_else(|| DomainError::not_found(format!("item of spares request {}", self.id)))?;

        Ok(vec![SparesEvent::Issued(SparesIssued {
            request_id: cmd.request_id,
            inventory_item_id,
            quantity: cmd.quantity,
            quantity_fulfilled,
            status,
            fulfilled_by: cmd.fulfilled_by,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectSparesRequest) -> Result<Vec<SparesEvent>, DomainError> {
        self.ensure_open(cmd.request_id, "reject spares request")?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::bad_request("a rejection reason is required"));
        }

        Ok(vec![SparesEvent::Rejected(SparesRequestRejected {
            request_id: cmd.request_id,
            rejected_by: cmd.rejected_by,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
