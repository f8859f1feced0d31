use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolroom_core::{
    Aggregate, AggregateRoot, DocumentNumber, DomainError, HandoverId, PrItemId, ProjectId,
    PurchaseRequisitionId, UserId,
};
use toolroom_events::Event;
use toolroom_purchasing::{PrItem, PrStatus, PurchaseRequisition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandoverStatus {
    PendingInspection,
    Approved,
    Rejected,
}

impl core::fmt::Display for HandoverStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            HandoverStatus::PendingInspection => "PendingInspection",
            HandoverStatus::Approved => "Approved",
            HandoverStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// What was physically received for one PR item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedItem {
    pub pr_item_id: PrItemId,
    pub part_number: String,
    pub tool_number: String,
    pub quantity_received: i64,
}

/// Immutable copy of a PR item taken when the handover is created, plus what arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverItem {
    pub pr_item_id: PrItemId,
    pub item_code: String,
    pub name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub requirements: Option<String>,
    pub part_number: String,
    pub tool_number: String,
    pub quantity_received: i64,
    pub is_critical_spare: bool,
}

impl HandoverItem {
    fn snapshot(source: &PrItem, received: &ReceivedItem, is_critical_spare: bool) -> Self {
        Self {
            pr_item_id: source.id,
            item_code: source.item_code.clone(),
            name: source.name.clone(),
            specification: source.specification.clone(),
            quantity: source.quantity,
            requirements: source.requirements.clone(),
            part_number: received.part_number.trim().to_string(),
            tool_number: received.tool_number.trim().to_string(),
            quantity_received: received.quantity_received,
            is_critical_spare,
        }
    }
}

/// Aggregate root: ToolHandover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHandover {
    id: HandoverId,
    handover_number: Option<DocumentNumber>,
    project_id: Option<ProjectId>,
    pr_id: Option<PurchaseRequisitionId>,
    description: Option<String>,
    items: Vec<HandoverItem>,
    status: HandoverStatus,
    created_by: Option<UserId>,
    inspected_by: Option<UserId>,
    inspected_at: Option<DateTime<Utc>>,
    remarks: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ToolHandover {
    pub fn empty(id: HandoverId) -> Self {
        Self {
            id,
            handover_number: None,
            project_id: None,
            pr_id: None,
            description: None,
            items: Vec::new(),
            status: HandoverStatus::PendingInspection,
            created_by: None,
            inspected_by: None,
            inspected_at: None,
            remarks: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> HandoverId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn handover_number(&self) -> Option<&DocumentNumber> {
        self.handover_number.as_ref()
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn pr_id(&self) -> Option<PurchaseRequisitionId> {
        self.pr_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn items(&self) -> &[HandoverItem] {
        &self.items
    }

    pub fn status(&self) -> HandoverStatus {
        self.status
    }

    /// Whether this handover blocks another one for the same requisition.
    pub fn is_active(&self) -> bool {
        self.created && self.status != HandoverStatus::Rejected
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn inspected_by(&self) -> Option<UserId> {
        self.inspected_by
    }

    pub fn inspected_at(&self) -> Option<DateTime<Utc>> {
        self.inspected_at
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl AggregateRoot for ToolHandover {
    type Id = HandoverId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateHandover.
///
/// Carries the requisition as loaded inside the same transaction so that readiness
/// and item membership are checked against what is actually stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHandover {
    pub handover_id: HandoverId,
    pub handover_number: DocumentNumber,
    pub project_id: ProjectId,
    pub requisition: PurchaseRequisition,
    pub description: Option<String>,
    pub items: Vec<ReceivedItem>,
    pub critical_spares: Vec<ReceivedItem>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveHandover {
    pub handover_id: HandoverId,
    pub inspected_by: UserId,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectHandover {
    pub handover_id: HandoverId,
    pub inspected_by: UserId,
    pub remarks: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoverCommand {
    Create(CreateHandover),
    Approve(ApproveHandover),
    Reject(RejectHandover),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverCreated {
    pub handover_id: HandoverId,
    pub handover_number: DocumentNumber,
    pub project_id: ProjectId,
    pub pr_id: PurchaseRequisitionId,
    pub description: Option<String>,
    pub items: Vec<HandoverItem>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverInspected {
    pub handover_id: HandoverId,
    pub inspected_by: UserId,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoverEvent {
    Created(HandoverCreated),
    Approved(HandoverInspected),
    Rejected(HandoverInspected),
}

impl Event for HandoverEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HandoverEvent::Created(_) => "handover.created",
            HandoverEvent::Approved(_) => "handover.approved",
            HandoverEvent::Rejected(_) => "handover.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            HandoverEvent::Created(e) => e.occurred_at,
            HandoverEvent::Approved(e) | HandoverEvent::Rejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ToolHandover {
    type Command = HandoverCommand;
    type Event = HandoverEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            HandoverEvent::Created(e) => {
                self.id = e.handover_id;
                self.handover_number = Some(e.handover_number.clone());
                self.project_id = Some(e.project_id);
                self.pr_id = Some(e.pr_id);
                self.description = e.description.clone();
                self.items = e.items.clone();
                self.status = HandoverStatus::PendingInspection;
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            HandoverEvent::Approved(e) => {
                self.status = HandoverStatus::Approved;
                self.inspected_by = Some(e.inspected_by);
                self.inspected_at = Some(e.occurred_at);
                self.remarks = e.remarks.clone();
            }
            HandoverEvent::Rejected(e) => {
                self.status = HandoverStatus::Rejected;
                self.inspected_by = Some(e.inspected_by);
                self.inspected_at = Some(e.occurred_at);
                self.remarks = e.remarks.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            HandoverCommand::Create(cmd) => self.handle_create(cmd),
            HandoverCommand::Approve(cmd) => self.handle_approve(cmd),
            HandoverCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl ToolHandover {
    fn handle_create(&self, cmd: &CreateHandover) -> Result<Vec<HandoverEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("handover {} already exists", self.id)));
        }

        let pr = &cmd.requisition;
        if !pr.is_created() {
            return Err(DomainError::not_found(format!(
                "purchase requisition {}",
                pr.id_typed()
            )));
        }
        if pr.project_id() != Some(cmd.project_id) {
            return Err(DomainError::bad_request(format!(
                "purchase requisition {} does not belong to project {}",
                pr.id_typed(),
                cmd.project_id
            )));
        }
        if pr.status() != PrStatus::ItemsReceived {
            return Err(DomainError::invalid_transition(
                "create handover",
                "ItemsReceived",
                pr.status(),
            ));
        }
        if cmd.items.is_empty() && cmd.critical_spares.is_empty() {
            return Err(DomainError::bad_request("a handover needs at least one item"));
        }

        let mut seen = HashSet::new();
        let tagged = cmd
            .items
            .iter()
            .map(|i| (i, false))
            .chain(cmd.critical_spares.iter().map(|i| (i, true)));

        let mut items = Vec::with_capacity(cmd.items.len() + cmd.critical_spares.len());
        for (received, is_critical_spare) in tagged {
            let source = pr.item(received.pr_item_id).ok_or_else(|| {
                DomainError::bad_request(format!(
                    "item {} does not belong to purchase requisition {}",
                    received.pr_item_id,
                    pr.id_typed()
                ))
            })?;
            if !seen.insert(received.pr_item_id) {
                return Err(DomainError::bad_request(format!(
                    "item {} appears more than once",
                    received.pr_item_id
                )));
            }
            if received.quantity_received <= 0 {
                return Err(DomainError::bad_request(format!(
                    "item {}: received quantity must be positive",
                    source.sequence_number
                )));
            }
            if received.part_number.trim().is_empty() || received.tool_number.trim().is_empty() {
                return Err(DomainError::bad_request(format!(
                    "item {}: part number and tool number are required",
                    source.sequence_number
                )));
            }
            items.push(HandoverItem::snapshot(source, received, is_critical_spare));
        }

        Ok(vec![HandoverEvent::Created(HandoverCreated {
            handover_id: cmd.handover_id,
            handover_number: cmd.handover_number.clone(),
            project_id: cmd.project_id,
            pr_id: pr.id_typed(),
            description: cmd
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            items,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn ensure_pending(&self, handover_id: HandoverId, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("handover {}", self.id)));
        }
        if self.id != handover_id {
            return Err(DomainError::bad_request("handover_id mismatch"));
        }
        if self.status != HandoverStatus::PendingInspection {
            return Err(DomainError::invalid_transition(action, "PendingInspection", self.status));
        }
        Ok(())
    }

    fn handle_approve(&self, cmd: &ApproveHandover) -> Result<Vec<HandoverEvent>, DomainError> {
        self.ensure_pending(cmd.handover_id, "approve handover")?;

        Ok(vec![HandoverEvent::Approved(HandoverInspected {
            handover_id: cmd.handover_id,
            inspected_by: cmd.inspected_by,
            remarks: cmd.remarks.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectHandover) -> Result<Vec<HandoverEvent>, DomainError> {
        self.ensure_pending(cmd.handover_id, "reject handover")?;
        let remarks = cmd.remarks.trim();
        if remarks.is_empty() {
            return Err(DomainError::bad_request("rejection remarks are required"));
        }

        Ok(vec![HandoverEvent::Rejected(HandoverInspected {
            handover_id: cmd.handover_id,
            inspected_by: cmd.inspected_by,
            remarks: Some(remarks.to_string()),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolroom_core::{DocumentKind, QuotationId, SupplierId};
    use toolroom_events::execute;
    use toolroom_purchasing::{
        AdvanceRequisition, ApproveRequisition, AwardRequisition, CreateRequisition,
        CriticalSpareMarker, PrItemDraft, PrTransition, PrType, RequisitionCommand,
        RequisitionDraft,
    };

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn requisition_at(status_steps: &[PrTransition]) -> PurchaseRequisition {
        let pr_id = PurchaseRequisitionId::new();
        let mut pr = PurchaseRequisition::empty(pr_id);
        let items = ["IC-1", "IC-2"]
            .iter()
            .map(|code| PrItemDraft {
                id: PrItemId::new(),
                item_code: code.to_string(),
                name: format!("Die {code}"),
                specification: Some("D2 steel".to_string()),
                quantity: 4,
                requirements: Some("hardened".to_string()),
                bom_unit_price: None,
            })
            .collect();
        let create = RequisitionCommand::Create(CreateRequisition {
            pr_id,
            pr_number: DocumentNumber::first(DocumentKind::PurchaseRequisition, 2024).unwrap(),
            project_id: ProjectId::new(),
            requested_by: UserId::new(),
            draft: RequisitionDraft {
                title: "Die set".to_string(),
                pr_type: PrType::NewSet,
                mod_ref_reason: None,
                items,
                suppliers: vec![],
                critical_spares: vec![CriticalSpareMarker {
                    sequence_number: 2,
                    notes: None,
                }],
            },
            occurred_at: now(),
        });
        execute(&mut pr, &create).unwrap();

        for step in status_steps {
            let cmd = match step {
                PrTransition::Approve => RequisitionCommand::Approve(ApproveRequisition {
                    pr_id,
                    approved_by: UserId::new(),
                    comments: None,
                    occurred_at: now(),
                }),
                PrTransition::Award => RequisitionCommand::Award(AwardRequisition {
                    pr_id,
                    supplier_id: SupplierId::new(),
                    quotation_id: QuotationId::new(),
                    occurred_at: now(),
                }),
                other => RequisitionCommand::Advance(AdvanceRequisition {
                    pr_id,
                    transition: *other,
                    occurred_at: now(),
                }),
            };
            execute(&mut pr, &cmd).unwrap();
        }
        pr
    }

    fn received_pr() -> PurchaseRequisition {
        requisition_at(&[
            PrTransition::Approve,
            PrTransition::SendToSuppliers,
            PrTransition::BeginEvaluation,
            PrTransition::Award,
            PrTransition::MarkItemsReceived,
        ])
    }

    fn received(item: &PrItem, qty: i64) -> ReceivedItem {
        ReceivedItem {
            pr_item_id: item.id,
            part_number: "PN-9".to_string(),
            tool_number: format!("T-{}", item.sequence_number),
            quantity_received: qty,
        }
    }

    fn create_cmd(pr: &PurchaseRequisition, items: Vec<ReceivedItem>, critical: Vec<ReceivedItem>) -> HandoverCommand {
        HandoverCommand::Create(CreateHandover {
            handover_id: HandoverId::new(),
            handover_number: DocumentNumber::first(DocumentKind::Handover, 2024).unwrap(),
            project_id: pr.project_id().unwrap(),
            requisition: pr.clone(),
            description: Some("Delivered to toolroom".to_string()),
            items,
            critical_spares: critical,
            created_by: UserId::new(),
            occurred_at: now(),
        })
    }

    fn created_handover(pr: &PurchaseRequisition) -> ToolHandover {
        let cmd = create_cmd(
            pr,
            vec![received(&pr.items()[0], 4)],
            vec![received(&pr.items()[1], 2)],
        );
        let HandoverCommand::Create(ref c) = cmd else { unreachable!() };
        let mut handover = ToolHandover::empty(c.handover_id);
        execute(&mut handover, &cmd).unwrap();
        handover
    }

    #[test]
    fn create_snapshots_pr_items() {
        let pr = received_pr();
        let handover = created_handover(&pr);

        assert_eq!(handover.status(), HandoverStatus::PendingInspection);
        assert_eq!(handover.items().len(), 2);
        let first = &handover.items()[0];
        assert_eq!(first.item_code, "IC-1");
        assert_eq!(first.specification.as_deref(), Some("D2 steel"));
        assert!(!first.is_critical_spare);
        assert!(handover.items()[1].is_critical_spare);
    }

    #[test]
    fn create_requires_items_received() {
        let pr = requisition_at(&[PrTransition::Approve]);
        let cmd = create_cmd(&pr, vec![received(&pr.items()[0], 1)], vec![]);
        let err = ToolHandover::empty(HandoverId::new()).handle(&cmd).unwrap_err();
        assert!(err.message().contains("ItemsReceived"));
    }

    #[test]
    fn create_rejects_foreign_or_repeated_items() {
        let pr = received_pr();
        let other = received_pr();
        let foreign = create_cmd(&pr, vec![received(&other.items()[0], 1)], vec![]);
        assert!(ToolHandover::empty(HandoverId::new()).handle(&foreign).is_err());

        let repeated = create_cmd(
            &pr,
            vec![received(&pr.items()[0], 1)],
            vec![received(&pr.items()[0], 1)],
        );
        assert!(ToolHandover::empty(HandoverId::new()).handle(&repeated).is_err());

        let empty = create_cmd(&pr, vec![], vec![]);
        assert!(ToolHandover::empty(HandoverId::new()).handle(&empty).is_err());
    }

    #[test]
    fn create_checks_project_membership() {
        let pr = received_pr();
        let mut cmd = create_cmd(&pr, vec![received(&pr.items()[0], 1)], vec![]);
        if let HandoverCommand::Create(c) = &mut cmd {
            c.project_id = ProjectId::new();
        }
        assert!(ToolHandover::empty(HandoverId::new()).handle(&cmd).is_err());
    }

    #[test]
    fn reject_needs_remarks_and_pending_status() {
        let pr = received_pr();
        let mut handover = created_handover(&pr);
        let reject = |remarks: &str, h: &ToolHandover| {
            HandoverCommand::Reject(RejectHandover {
                handover_id: h.id_typed(),
                inspected_by: UserId::new(),
                remarks: remarks.to_string(),
                occurred_at: now(),
            })
        };

        let blank = reject("  ", &handover);
        assert!(execute(&mut handover, &blank).is_err());

        let cmd = reject("dimensions out of tolerance", &handover);
        execute(&mut handover, &cmd).unwrap();
        assert_eq!(handover.status(), HandoverStatus::Rejected);
        assert!(!handover.is_active());

        let approve = HandoverCommand::Approve(ApproveHandover {
            handover_id: handover.id_typed(),
            inspected_by: UserId::new(),
            remarks: None,
            occurred_at: now(),
        });
        let err = execute(&mut handover, &approve).unwrap_err();
        assert!(err.message().contains("PendingInspection"));
    }
}
