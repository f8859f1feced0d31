//! Tool handovers: receipt, inspection and the stock credit on approval.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use toolroom_core::{
    Actor, AggregateRoot, DocumentKind, DomainError, ExpectedVersion, HandoverId, ProjectId,
    PurchaseRequisitionId, Role,
};
use toolroom_events::{NotificationIntent, execute};
use toolroom_handover::{
    ApproveHandover, CreateHandover, HandoverCommand, ReceivedItem, RejectHandover, ToolHandover,
};
use toolroom_inventory::{InventoryItem, InventoryKey, ReferenceType, StockLevels, StockMovement, StockReference};

use super::ServiceContext;
use crate::error::ServiceResult;
use crate::ledger;
use crate::store::{HANDOVER, Tables, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverInput {
    pub project_id: ProjectId,
    pub pr_id: PurchaseRequisitionId,
    pub description: Option<String>,
    pub items: Vec<ReceivedItem>,
    #[serde(default)]
    pub critical_spares: Vec<ReceivedItem>,
}

fn run(
    tables: &mut Tables,
    handover_id: HandoverId,
    cmd: &HandoverCommand,
) -> ServiceResult<ToolHandover> {
    let mut handover = tables.handover(handover_id)?.clone();
    let base = handover.version();
    let events = execute(&mut handover, cmd)?;
    tables.commit_handover(handover.clone(), ExpectedVersion::Exact(base), &events)?;
    Ok(handover)
}

pub struct HandoverService<S> {
    ctx: ServiceContext<S>,
}

impl<S> HandoverService<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self { ctx }
    }

    /// Record received items for a requisition in `ItemsReceived`.
    ///
    /// Refused with `Conflict` while another handover of the same requisition is pending
    /// inspection or already approved.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, pr_id = %input.pr_id), err)]
    pub fn create(&self, actor: Actor, input: HandoverInput) -> ServiceResult<ToolHandover> {
        let handover_number = self.ctx.allocate(DocumentKind::Handover)?;
        let now = self.ctx.clock.now();
        let handover_id = HandoverId::new();
        let HandoverInput {
            project_id,
            pr_id,
            description,
            items,
            critical_spares,
        } = input;

        let handover = self.ctx.store.write(|tables| {
            tables.project(project_id)?;
            let requisition = tables.requisition(pr_id)?.clone();
            if let Some(active) = tables.handovers_for(pr_id).find(|h| h.is_active()) {
                return Err(DomainError::conflict(format!(
                    "handover {} for purchase requisition {pr_id} is already {}",
                    active.id_typed(),
                    active.status()
                ))
                .into());
            }
            tables.claim_number(&handover_number)?;

            let mut handover = ToolHandover::empty(handover_id);
            let cmd = HandoverCommand::Create(CreateHandover {
                handover_id,
                handover_number: handover_number.clone(),
                project_id,
                requisition,
                description,
                items,
                critical_spares,
                created_by: actor.user_id,
                occurred_at: now,
            });
            let events = execute(&mut handover, &cmd)?;
            tables.commit_handover(handover.clone(), ExpectedVersion::Exact(0), &events)?;
            Ok(handover)
        })?;

        tracing::info!(
            handover_id = %handover_id,
            handover_number = %handover_number,
            items = handover.items().len(),
            "handover created"
        );
        self.ctx.notify(NotificationIntent::new(
            Role::Maintenance,
            "Handover pending inspection",
            format!(
                "{handover_number}: {} item(s) are waiting for inspection",
                handover.items().len()
            ),
            HANDOVER,
            handover_id,
        ));
        Ok(handover)
    }

    /// Approve a pending handover and credit every item to inventory.
    ///
    /// The status change and all credits commit together. Each credit is keyed by
    /// `(handover, pr item)`, so a replayed credit does not move stock twice.
    #[instrument(skip(self, actor, remarks), fields(user_id = %actor.user_id), err)]
    pub fn approve(
        &self,
        actor: Actor,
        handover_id: HandoverId,
        remarks: Option<String>,
    ) -> ServiceResult<ToolHandover> {
        let now = self.ctx.clock.now();
        let levels = StockLevels::new(self.ctx.config.default_min_stock_level, None)?;
        let cmd = HandoverCommand::Approve(ApproveHandover {
            handover_id,
            inspected_by: actor.user_id,
            remarks,
            occurred_at: now,
        });

        let (handover, credited) = self.ctx.store.write(|tables| {
            let handover = run(tables, handover_id, &cmd)?;

            let mut credited: BTreeMap<_, InventoryItem> = BTreeMap::new();
            for item in handover.items() {
                let key = InventoryKey::new(&item.part_number, &item.tool_number, Some(&item.item_code))?;
                let target = ledger::find_or_register(tables, key, &item.name, levels, now)?;
                let reference = StockReference::document(ReferenceType::Handover, handover_id, actor.user_id)
                    .with_line(item.pr_item_id);
                let outcome = ledger::record_movement(
                    tables,
                    target.id_typed(),
                    StockMovement::Add(item.quantity_received),
                    reference,
                    now,
                )?;
                credited.insert(outcome.item.id_typed(), outcome.item);
            }
            Ok((handover, credited))
        })?;

        tracing::info!(
            handover_id = %handover_id,
            credited_items = credited.len(),
            "handover approved; stock credited"
        );
        self.ctx.notify_low_stock(credited.values());
        Ok(handover)
    }

    #[instrument(skip(self, actor, remarks), fields(user_id = %actor.user_id), err)]
    pub fn reject(
        &self,
        actor: Actor,
        handover_id: HandoverId,
        remarks: String,
    ) -> ServiceResult<ToolHandover> {
        let cmd = HandoverCommand::Reject(RejectHandover {
            handover_id,
            inspected_by: actor.user_id,
            remarks,
            occurred_at: self.ctx.clock.now(),
        });
        let handover = self.ctx.store.write(|tables| run(tables, handover_id, &cmd))?;
        tracing::info!(handover_id = %handover_id, "handover rejected");
        Ok(handover)
    }

    pub fn get(&self, handover_id: HandoverId) -> ServiceResult<ToolHandover> {
        self.ctx
            .store
            .read(|tables| Ok(tables.handover(handover_id)?.clone()))
    }

    pub fn list_for_pr(&self, pr_id: PurchaseRequisitionId) -> ServiceResult<Vec<ToolHandover>> {
        self.ctx.store.read(|tables| {
            tables.requisition(pr_id)?;
            Ok(tables.handovers_for(pr_id).cloned().collect())
        })
    }
}
