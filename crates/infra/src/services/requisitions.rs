//! Purchase requisition lifecycle.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use toolroom_core::{
    Actor, AggregateRoot, DocumentKind, DomainError, ExpectedVersion, PrItemId, ProjectId,
    PurchaseRequisitionId, QuotationId, Role, SupplierId,
};
use toolroom_events::{NotificationIntent, execute};
use toolroom_purchasing::{
    AdvanceRequisition, ApproveRequisition, AwardRequisition, CreateRequisition,
    CriticalSpareMarker, DeleteRequisition, PrItemDraft, PrStatus, PrTransition, PrType,
    PurchaseRequisition, RejectRequisition, RequisitionCommand, RequisitionDraft,
    RequisitionEvent, UpdateRequisition,
};

use super::ServiceContext;
use crate::error::ServiceResult;
use crate::store::{REQUISITION, Tables, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisitionItem {
    pub item_code: String,
    pub name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub requirements: Option<String>,
    pub bom_unit_price: Option<i64>,
}

/// Caller-supplied contents of a requisition (create and update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionInput {
    pub title: String,
    pub pr_type: PrType,
    pub mod_ref_reason: Option<String>,
    pub items: Vec<NewRequisitionItem>,
    #[serde(default)]
    pub suppliers: Vec<SupplierId>,
    /// Markers reference items by their 1-based position in `items`.
    #[serde(default)]
    pub critical_spares: Vec<CriticalSpareMarker>,
}

impl RequisitionInput {
    fn into_draft(self) -> RequisitionDraft {
        RequisitionDraft {
            title: self.title,
            pr_type: self.pr_type,
            mod_ref_reason: self.mod_ref_reason,
            items: self
                .items
                .into_iter()
                .map(|item| PrItemDraft {
                    id: PrItemId::new(),
                    item_code: item.item_code,
                    name: item.name,
                    specification: item.specification,
                    quantity: item.quantity,
                    requirements: item.requirements,
                    bom_unit_price: item.bom_unit_price,
                })
                .collect(),
            suppliers: self.suppliers,
            critical_spares: self.critical_spares,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionFilter {
    pub status: Option<PrStatus>,
    pub project_id: Option<ProjectId>,
}

impl RequisitionFilter {
    fn matches(&self, pr: &PurchaseRequisition) -> bool {
        self.status.is_none_or(|s| pr.status() == s)
            && self.project_id.is_none_or(|p| pr.project_id() == Some(p))
    }
}

fn ensure_suppliers_exist(tables: &Tables, suppliers: &[SupplierId]) -> ServiceResult<()> {
    for supplier_id in suppliers {
        tables.supplier(*supplier_id)?;
    }
    Ok(())
}

/// Load, decide, save. Returns the updated requisition and the events it produced.
pub(crate) fn run(
    tables: &mut Tables,
    pr_id: PurchaseRequisitionId,
    cmd: &RequisitionCommand,
) -> ServiceResult<(PurchaseRequisition, Vec<RequisitionEvent>)> {
    let mut pr = tables.requisition(pr_id)?.clone();
    let base = pr.version();
    let events = execute(&mut pr, cmd)?;
    if !events.is_empty() {
        tables.commit_requisition(pr.clone(), ExpectedVersion::Exact(base), &events)?;
    }
    Ok((pr, events))
}

pub struct RequisitionService<S> {
    ctx: ServiceContext<S>,
}

impl<S> RequisitionService<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self { ctx }
    }

    /// Allocate a number and record a new requisition in `Submitted`.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id), err)]
    pub fn create(
        &self,
        actor: Actor,
        project_id: ProjectId,
        input: RequisitionInput,
    ) -> ServiceResult<PurchaseRequisition> {
        let pr_number = self.ctx.allocate(DocumentKind::PurchaseRequisition)?;
        let now = self.ctx.clock.now();
        let pr_id = PurchaseRequisitionId::new();
        let draft = input.into_draft();

        let pr = self.ctx.store.write(|tables| {
            tables.project(project_id)?;
            ensure_suppliers_exist(tables, &draft.suppliers)?;
            tables.claim_number(&pr_number)?;

            let mut pr = PurchaseRequisition::empty(pr_id);
            let cmd = RequisitionCommand::Create(CreateRequisition {
                pr_id,
                pr_number: pr_number.clone(),
                project_id,
                requested_by: actor.user_id,
                draft,
                occurred_at: now,
            });
            let events = execute(&mut pr, &cmd)?;
            tables.commit_requisition(pr.clone(), ExpectedVersion::Exact(0), &events)?;
            Ok(pr)
        })?;

        tracing::info!(pr_id = %pr_id, pr_number = %pr_number, "purchase requisition created");
        self.ctx.notify(NotificationIntent::new(
            Role::Approver,
            "New purchase requisition",
            format!("{pr_number} \"{}\" is waiting for approval", pr.title()),
            REQUISITION,
            pr_id,
        ));
        Ok(pr)
    }

    /// Replace the contents of a requisition that is still `Submitted`.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id), err)]
    pub fn update(
        &self,
        actor: Actor,
        pr_id: PurchaseRequisitionId,
        input: RequisitionInput,
    ) -> ServiceResult<PurchaseRequisition> {
        let now = self.ctx.clock.now();
        let draft = input.into_draft();
        let (pr, _) = self.ctx.store.write(|tables| {
            ensure_suppliers_exist(tables, &draft.suppliers)?;
            let cmd = RequisitionCommand::Update(UpdateRequisition {
                pr_id,
                actor,
                draft,
                occurred_at: now,
            });
            run(tables, pr_id, &cmd)
        })?;
        tracing::info!(pr_id = %pr_id, "purchase requisition updated");
        Ok(pr)
    }

    #[instrument(skip(self, actor, comments), fields(user_id = %actor.user_id), err)]
    pub fn approve(
        &self,
        actor: Actor,
        pr_id: PurchaseRequisitionId,
        comments: Option<String>,
    ) -> ServiceResult<PurchaseRequisition> {
        let cmd = RequisitionCommand::Approve(ApproveRequisition {
            pr_id,
            approved_by: actor.user_id,
            comments,
            occurred_at: self.ctx.clock.now(),
        });
        let (pr, _) = self.ctx.store.write(|tables| run(tables, pr_id, &cmd))?;

        tracing::info!(pr_id = %pr_id, "purchase requisition approved");
        self.notify_reviewed(&pr, "Purchase requisition approved", "approved");
        Ok(pr)
    }

    #[instrument(skip(self, actor, comments), fields(user_id = %actor.user_id), err)]
    pub fn reject(
        &self,
        actor: Actor,
        pr_id: PurchaseRequisitionId,
        comments: String,
    ) -> ServiceResult<PurchaseRequisition> {
        let cmd = RequisitionCommand::Reject(RejectRequisition {
            pr_id,
            rejected_by: actor.user_id,
            comments,
            occurred_at: self.ctx.clock.now(),
        });
        let (pr, _) = self.ctx.store.write(|tables| run(tables, pr_id, &cmd))?;

        tracing::info!(pr_id = %pr_id, "purchase requisition rejected");
        self.notify_reviewed(&pr, "Purchase requisition rejected", "rejected");
        Ok(pr)
    }

    fn notify_reviewed(&self, pr: &PurchaseRequisition, title: &str, outcome: &str) {
        let number = pr.pr_number().map(ToString::to_string).unwrap_or_default();
        self.ctx.notify(NotificationIntent::new(
            Role::Npd,
            title,
            format!("{number} \"{}\" was {outcome}", pr.title()),
            REQUISITION,
            pr.id_typed(),
        ));
    }

    pub fn send_to_suppliers(&self, actor: Actor, pr_id: PurchaseRequisitionId) -> ServiceResult<PurchaseRequisition> {
        self.advance(actor, pr_id, PrTransition::SendToSuppliers)
    }

    pub fn begin_evaluation(&self, actor: Actor, pr_id: PurchaseRequisitionId) -> ServiceResult<PurchaseRequisition> {
        self.advance(actor, pr_id, PrTransition::BeginEvaluation)
    }

    pub fn submit_for_approval(&self, actor: Actor, pr_id: PurchaseRequisitionId) -> ServiceResult<PurchaseRequisition> {
        self.advance(actor, pr_id, PrTransition::SubmitForApproval)
    }

    /// Called by the receiving step once the awarded goods are physically in.
    pub fn mark_items_received(&self, actor: Actor, pr_id: PurchaseRequisitionId) -> ServiceResult<PurchaseRequisition> {
        self.advance(actor, pr_id, PrTransition::MarkItemsReceived)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id), err)]
    fn advance(
        &self,
        actor: Actor,
        pr_id: PurchaseRequisitionId,
        transition: PrTransition,
    ) -> ServiceResult<PurchaseRequisition> {
        let cmd = RequisitionCommand::Advance(AdvanceRequisition {
            pr_id,
            transition,
            occurred_at: self.ctx.clock.now(),
        });
        let (pr, _) = self.ctx.store.write(|tables| run(tables, pr_id, &cmd))?;
        tracing::info!(pr_id = %pr_id, status = %pr.status(), "purchase requisition advanced");
        Ok(pr)
    }

    /// Award the requisition to the supplier of `quotation_id`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id), err)]
    pub fn award(
        &self,
        actor: Actor,
        pr_id: PurchaseRequisitionId,
        supplier_id: SupplierId,
        quotation_id: QuotationId,
    ) -> ServiceResult<PurchaseRequisition> {
        let now = self.ctx.clock.now();
        let (pr, _) = self.ctx.store.write(|tables| {
            PrTransition::Award.apply_to(tables.requisition(pr_id)?.status())?;
            tables.supplier(supplier_id)?;
            let quotation = tables.quotation(quotation_id)?;
            if quotation.pr_id() != Some(pr_id) {
                return Err(DomainError::bad_request(format!(
                    "quotation {quotation_id} was not submitted for purchase requisition {pr_id}"
                ))
                .into());
            }
            if quotation.supplier_id() != Some(supplier_id) {
                return Err(DomainError::bad_request(format!(
                    "quotation {quotation_id} was not submitted by supplier {supplier_id}"
                ))
                .into());
            }

            let cmd = RequisitionCommand::Award(AwardRequisition {
                pr_id,
                supplier_id,
                quotation_id,
                occurred_at: now,
            });
            run(tables, pr_id, &cmd)
        })?;
        tracing::info!(pr_id = %pr_id, supplier_id = %supplier_id, "purchase requisition awarded");
        Ok(pr)
    }

    /// Delete a `Submitted` requisition together with its quotations.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id), err)]
    pub fn delete(&self, actor: Actor, pr_id: PurchaseRequisitionId) -> ServiceResult<()> {
        let cmd = RequisitionCommand::Delete(DeleteRequisition {
            pr_id,
            occurred_at: self.ctx.clock.now(),
        });
        let removed = self.ctx.store.write(|tables| {
            run(tables, pr_id, &cmd)?;
            Ok(tables.purge_requisition(pr_id))
        })?;
        tracing::info!(pr_id = %pr_id, quotations = removed.len(), "purchase requisition deleted");
        Ok(())
    }

    pub fn get(&self, pr_id: PurchaseRequisitionId) -> ServiceResult<PurchaseRequisition> {
        self.ctx
            .store
            .read(|tables| Ok(tables.requisition(pr_id)?.clone()))
    }

    /// Requisitions matching `filter`, oldest first.
    pub fn list(&self, filter: &RequisitionFilter) -> ServiceResult<Vec<PurchaseRequisition>> {
        self.ctx.store.read(|tables| {
            Ok(tables
                .requisitions()
                .filter(|pr| filter.matches(pr))
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, actor};
    use toolroom_core::ErrorKind;
    use toolroom_purchasing::InvitationStatus;

    #[test]
    fn create_numbers_the_requisition_and_notifies_approvers() {
        let fx = Fixture::new();
        let requester = actor(Role::Requester);

        let pr = fx
            .engine
            .requisitions
            .create(requester, fx.project_id, fx.requisition_input())
            .unwrap();

        assert_eq!(pr.pr_number().unwrap().to_string(), "PR-2024-001");
        assert_eq!(pr.status(), PrStatus::Submitted);
        assert_eq!(pr.requested_by(), Some(requester.user_id));
        assert!(pr.suppliers().iter().all(|s| s.status == InvitationStatus::Invited));
        assert_eq!(fx.notifier.sent_to(Role::Approver).len(), 1);

        let second = fx
            .engine
            .requisitions
            .create(requester, fx.project_id, fx.requisition_input())
            .unwrap();
        assert_eq!(second.pr_number().unwrap().to_string(), "PR-2024-002");
    }

    #[test]
    fn unknown_project_or_supplier_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .engine
            .requisitions
            .create(actor(Role::Requester), ProjectId::new(), fx.requisition_input())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut input = fx.requisition_input();
        input.suppliers.push(SupplierId::new());
        let err = fx
            .engine
            .requisitions
            .create(actor(Role::Requester), fx.project_id, input)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn modification_without_reason_is_rejected() {
        let fx = Fixture::new();
        let mut input = fx.requisition_input();
        input.pr_type = PrType::Modification;
        input.mod_ref_reason = Some("   ".to_string());

        let err = fx
            .engine
            .requisitions
            .create(actor(Role::Requester), fx.project_id, input)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(fx.engine.requisitions.list(&RequisitionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn approve_twice_fails_and_leaves_state() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let approver = actor(Role::Approver);

        fx.engine.requisitions.approve(approver, pr.id_typed(), None).unwrap();
        let err = fx
            .engine
            .requisitions
            .approve(approver, pr.id_typed(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("Submitted"));
        assert_eq!(
            fx.engine.requisitions.get(pr.id_typed()).unwrap().status(),
            PrStatus::Approved
        );
        assert_eq!(fx.notifier.sent_to(Role::Npd).len(), 1);
    }

    #[test]
    fn reject_records_comments_and_accepts_empty_ones() {
        let fx = Fixture::new();
        let blank = fx.submitted_pr();
        let rejected = fx
            .engine
            .requisitions
            .reject(actor(Role::Approver), blank.id_typed(), String::new())
            .unwrap();
        assert_eq!(rejected.status(), PrStatus::Rejected);
        assert_eq!(rejected.approval_comments(), None);

        let pr = fx.submitted_pr();
        let rejected = fx
            .engine
            .requisitions
            .reject(actor(Role::Approver), pr.id_typed(), "over budget".to_string())
            .unwrap();
        assert_eq!(rejected.status(), PrStatus::Rejected);
        assert_eq!(rejected.approval_comments(), Some("over budget"));
    }

    #[test]
    fn only_owner_or_admin_may_update() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();

        let mut input = fx.requisition_input();
        input.title = "Revised".to_string();
        let err = fx
            .engine
            .requisitions
            .update(actor(Role::Requester), pr.id_typed(), input.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = fx
            .engine
            .requisitions
            .update(actor(Role::Admin), pr.id_typed(), input)
            .unwrap();
        assert_eq!(updated.title(), "Revised");
    }

    #[test]
    fn award_checks_the_quotation() {
        let fx = Fixture::new();
        let pr = fx.pr_in_evaluation();
        let quotation = fx.quote(pr.id_typed(), fx.supplier_a, 44_000);
        let npd = actor(Role::Npd);

        let err = fx
            .engine
            .requisitions
            .award(npd, pr.id_typed(), fx.supplier_b, quotation.id_typed())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = fx
            .engine
            .requisitions
            .award(npd, pr.id_typed(), fx.supplier_a, QuotationId::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let awarded = fx
            .engine
            .requisitions
            .award(npd, pr.id_typed(), fx.supplier_a, quotation.id_typed())
            .unwrap();
        assert_eq!(awarded.status(), PrStatus::Awarded);
        assert_eq!(awarded.awarded_supplier_id(), Some(fx.supplier_a));
        assert_eq!(awarded.awarded_quotation_id(), Some(quotation.id_typed()));
    }

    #[test]
    fn award_reports_the_status_before_the_quotation() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let quotation = fx.quote(pr.id_typed(), fx.supplier_a, 44_000);

        let err = fx
            .engine
            .requisitions
            .award(actor(Role::Npd), pr.id_typed(), fx.supplier_b, quotation.id_typed())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let message = err.to_string();
        assert!(message.contains("EvaluationPending or SubmittedForApproval"), "{message}");
        assert_eq!(
            fx.engine.requisitions.get(pr.id_typed()).unwrap().status(),
            PrStatus::Submitted
        );
    }

    #[test]
    fn delete_cascades_to_quotations() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let quotation = fx.quote(pr.id_typed(), fx.supplier_a, 10_000);

        fx.engine
            .requisitions
            .delete(actor(Role::Admin), pr.id_typed())
            .unwrap();

        let err = fx.engine.requisitions.get(pr.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx.engine.quotations.get(quotation.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_after_approval_is_refused() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        fx.engine
            .requisitions
            .approve(actor(Role::Approver), pr.id_typed(), None)
            .unwrap();

        let err = fx
            .engine
            .requisitions
            .delete(actor(Role::Admin), pr.id_typed())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn list_filters_by_status_and_project() {
        let fx = Fixture::new();
        let first = fx.submitted_pr();
        fx.submitted_pr();
        fx.engine
            .requisitions
            .approve(actor(Role::Approver), first.id_typed(), None)
            .unwrap();

        let approved = fx
            .engine
            .requisitions
            .list(&RequisitionFilter {
                status: Some(PrStatus::Approved),
                project_id: None,
            })
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id_typed(), first.id_typed());

        let elsewhere = fx
            .engine
            .requisitions
            .list(&RequisitionFilter {
                status: None,
                project_id: Some(ProjectId::new()),
            })
            .unwrap();
        assert!(elsewhere.is_empty());
    }
}
