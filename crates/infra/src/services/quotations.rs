//! Supplier quotations and their comparison.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use toolroom_core::{
    Actor, AggregateRoot, DocumentKind, DomainError, ExpectedVersion, PurchaseRequisitionId,
    QuotationId, Role, SupplierId,
};
use toolroom_events::{NotificationIntent, execute};
use toolroom_purchasing::{
    ComparisonEntry, EvaluateQuotation, Quotation, QuotationCommand, QuotationComparison,
    QuotationLine, QuotationStatus, RecordSupplierQuoted, RequisitionCommand, SubmitQuotation,
    compare,
};

use super::ServiceContext;
use super::requisitions;
use crate::error::ServiceResult;
use crate::store::{QUOTATION, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationInput {
    pub pr_id: PurchaseRequisitionId,
    pub supplier_id: SupplierId,
    pub lines: Vec<QuotationLine>,
    pub delivery_date: Option<NaiveDate>,
    pub terms: Option<String>,
}

pub struct QuotationService<S> {
    ctx: ServiceContext<S>,
}

impl<S> QuotationService<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self { ctx }
    }

    /// Record a supplier's quotation against a requisition.
    ///
    /// The supplier's invitation on the requisition, if any, flips to `Quoted`.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, pr_id = %input.pr_id), err)]
    pub fn create(&self, actor: Actor, input: QuotationInput) -> ServiceResult<Quotation> {
        let quotation_number = self.ctx.allocate(DocumentKind::Quotation)?;
        let now = self.ctx.clock.now();
        let quotation_id = QuotationId::new();
        let QuotationInput {
            pr_id,
            supplier_id,
            lines,
            delivery_date,
            terms,
        } = input;

        let (quotation, pr_number) = self.ctx.store.write(|tables| {
            let pr = tables.requisition(pr_id)?;
            let pr_number = pr.pr_number().map(ToString::to_string).unwrap_or_default();
            for line in &lines {
                if let Some(item_id) = line.pr_item_id {
                    if pr.item(item_id).is_none() {
                        return Err(DomainError::bad_request(format!(
                            "item {item_id} does not belong to purchase requisition {pr_id}"
                        ))
                        .into());
                    }
                }
            }
            tables.supplier(supplier_id)?;
            tables.claim_number(&quotation_number)?;

            let mut quotation = Quotation::empty(quotation_id);
            let cmd = QuotationCommand::Submit(SubmitQuotation {
                quotation_id,
                quotation_number: quotation_number.clone(),
                pr_id,
                supplier_id,
                lines,
                delivery_date,
                terms,
                occurred_at: now,
            });
            let events = execute(&mut quotation, &cmd)?;
            tables.commit_quotation(quotation.clone(), ExpectedVersion::Exact(0), &events)?;

            let quoted = RequisitionCommand::RecordSupplierQuoted(RecordSupplierQuoted {
                pr_id,
                supplier_id,
                occurred_at: now,
            });
            requisitions::run(tables, pr_id, &quoted)?;
            Ok((quotation, pr_number))
        })?;

        tracing::info!(
            quotation_id = %quotation_id,
            quotation_number = %quotation_number,
            total_price = quotation.total_price(),
            "quotation recorded"
        );
        self.ctx.notify(NotificationIntent::new(
            Role::Npd,
            "Quotation received",
            format!("{quotation_number} received for {pr_number}"),
            QUOTATION,
            quotation_id,
        ));
        Ok(quotation)
    }

    /// Mark a pending quotation `Selected` or `Rejected`.
    #[instrument(skip(self, actor, notes), fields(user_id = %actor.user_id), err)]
    pub fn evaluate(
        &self,
        actor: Actor,
        quotation_id: QuotationId,
        decision: QuotationStatus,
        notes: Option<String>,
    ) -> ServiceResult<Quotation> {
        let cmd = QuotationCommand::Evaluate(EvaluateQuotation {
            quotation_id,
            decision,
            evaluated_by: actor.user_id,
            notes,
            occurred_at: self.ctx.clock.now(),
        });
        let quotation = self.ctx.store.write(|tables| {
            let mut quotation = tables.quotation(quotation_id)?.clone();
            let base = quotation.version();
            let events = execute(&mut quotation, &cmd)?;
            tables.commit_quotation(quotation.clone(), ExpectedVersion::Exact(base), &events)?;
            Ok(quotation)
        })?;
        tracing::info!(quotation_id = %quotation_id, status = %quotation.status(), "quotation evaluated");
        Ok(quotation)
    }

    /// Rank every quotation of a requisition. Read-only.
    #[instrument(skip(self), err)]
    pub fn compare(&self, pr_id: PurchaseRequisitionId) -> ServiceResult<QuotationComparison> {
        self.ctx.store.read(|tables| {
            let entries = tables
                .quotations_for(pr_id)
                .filter_map(|q| {
                    let supplier = q.supplier_id().and_then(|id| tables.supplier(id).ok());
                    ComparisonEntry::from_quotation(
                        q,
                        supplier.map(|s| s.name.clone()).unwrap_or_default(),
                        supplier.and_then(|s| s.rating),
                    )
                })
                .collect();
            Ok(compare(pr_id, entries)?)
        })
    }

    pub fn get(&self, quotation_id: QuotationId) -> ServiceResult<Quotation> {
        self.ctx
            .store
            .read(|tables| Ok(tables.quotation(quotation_id)?.clone()))
    }

    /// Quotations of a requisition in the order they were received.
    pub fn list_for_pr(&self, pr_id: PurchaseRequisitionId) -> ServiceResult<Vec<Quotation>> {
        self.ctx.store.read(|tables| {
            tables.requisition(pr_id)?;
            Ok(tables.quotations_for(pr_id).cloned().collect())
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
    fn total_is_sum_of_line_totals_and_invitation_flips() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();

        let quotation = fx
            .engine
            .quotations
            .create(
                actor(Role::Npd),
                QuotationInput {
                    pr_id: pr.id_typed(),
                    supplier_id: fx.supplier_a,
                    lines: vec![
                        QuotationLine {
                            pr_item_id: Some(pr.items()[0].id),
                            description: "Carbide insert".to_string(),
                            quantity: 4,
                            unit_price: 1_500,
                        },
                        QuotationLine {
                            pr_item_id: None,
                            description: "Freight".to_string(),
                            quantity: 1,
                            unit_price: 2_000,
                        },
                    ],
                    delivery_date: NaiveDate::from_ymd_opt(2024, 4, 2),
                    terms: Some("Net 30".to_string()),
                },
            )
            .unwrap();

        assert_eq!(quotation.total_price(), 8_000);
        assert_eq!(quotation.status(), QuotationStatus::Pending);
        assert_eq!(quotation.quotation_number().unwrap().to_string(), "QUOT-2024-001");

        let pr = fx.engine.requisitions.get(pr.id_typed()).unwrap();
        let invite = pr.suppliers().iter().find(|s| s.supplier_id == fx.supplier_a).unwrap();
        assert_eq!(invite.status, InvitationStatus::Quoted);
        assert_eq!(fx.notifier.sent_to(Role::Npd).len(), 1);
    }

    #[test]
    fn lines_must_reference_items_of_the_requisition() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let other = fx.submitted_pr();

        let err = fx
            .engine
            .quotations
            .create(
                actor(Role::Npd),
                QuotationInput {
                    pr_id: pr.id_typed(),
                    supplier_id: fx.supplier_a,
                    lines: vec![QuotationLine {
                        pr_item_id: Some(other.items()[0].id),
                        description: "Wrong line".to_string(),
                        quantity: 1,
                        unit_price: 10,
                    }],
                    delivery_date: None,
                    terms: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn evaluation_happens_once() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let q = fx.quote(pr.id_typed(), fx.supplier_a, 5_000);
        let npd = actor(Role::Npd);

        let selected = fx
            .engine
            .quotations
            .evaluate(npd, q.id_typed(), QuotationStatus::Selected, Some("best fit".to_string()))
            .unwrap();
        assert_eq!(selected.status(), QuotationStatus::Selected);
        assert_eq!(selected.evaluated_by(), Some(npd.user_id));

        let err = fx
            .engine
            .quotations
            .evaluate(npd, q.id_typed(), QuotationStatus::Rejected, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn compare_recommends_the_cheapest() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        fx.quote(pr.id_typed(), fx.supplier_a, 72_000);
        fx.quote(pr.id_typed(), fx.supplier_b, 80_000);
        let cheapest = fx.quote(pr.id_typed(), fx.supplier_a, 44_000);

        let cmp = fx.engine.quotations.compare(pr.id_typed()).unwrap();
        assert_eq!(cmp.entries.len(), 3);
        assert_eq!(cmp.recommended, cheapest.id_typed());
        assert_eq!(cmp.entries[1].supplier_rating, Some(5));
        assert_eq!(cmp.highest_rated, Some(cmp.entries[1].quotation_id));
    }

    #[test]
    fn compare_without_quotations_is_not_found() {
        let fx = Fixture::new();
        let pr = fx.submitted_pr();
        let err = fx.engine.quotations.compare(pr.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
