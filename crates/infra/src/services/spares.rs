//! Spares requests drawn on inventory.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use toolroom_core::{
    Actor, AggregateRoot, DocumentKind, DomainError, ExpectedVersion, InventoryItemId, ProjectId,
    Role, SparesRequestId,
};
use toolroom_events::{NotificationIntent, execute};
use toolroom_inventory::{ReferenceType, StockMovement, StockReference};
use toolroom_spares::{
    CreateSparesRequest, FulfillSparesRequest, RejectSparesRequest, RequestedItem, SparesCommand,
    SparesRequest,
};

use super::ServiceContext;
use crate::error::ServiceResult;
use crate::ledger;
use crate::store::{SPARES_REQUEST, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparesRequestInput {
    pub inventory_item_id: InventoryItemId,
    pub quantity_requested: i64,
    pub project_id: Option<ProjectId>,
    pub purpose: Option<String>,
}

fn ensure_visible(actor: &Actor, request: &SparesRequest) -> Result<(), DomainError> {
    let owner = request.requested_by();
    if owner.is_some_and(|owner| actor.may_access_owned_by(owner)) {
        return Ok(());
    }
    Err(DomainError::forbidden(format!(
        "spares request {} belongs to another requester",
        request.id_typed()
    )))
}

pub struct SparesService<S> {
    ctx: ServiceContext<S>,
}

impl<S> SparesService<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, item_id = %input.inventory_item_id), err)]
    pub fn create(&self, actor: Actor, input: SparesRequestInput) -> ServiceResult<SparesRequest> {
        let request_number = self.ctx.allocate(DocumentKind::SparesRequest)?;
        let now = self.ctx.clock.now();
        let request_id = SparesRequestId::new();

        let request = self.ctx.store.write(|tables| {
            let item = tables.inventory_item(input.inventory_item_id)?;
            let snapshot = RequestedItem {
                inventory_item_id: item.id_typed(),
                name: item.name().to_string(),
                part_number: item.part_number().to_string(),
                tool_number: item.tool_number().to_string(),
            };
            if let Some(project_id) = input.project_id {
                tables.project(project_id)?;
            }
            tables.claim_number(&request_number)?;

            let mut request = SparesRequest::empty(request_id);
            let cmd = SparesCommand::Create(CreateSparesRequest {
                request_id,
                request_number: request_number.clone(),
                item: snapshot,
                quantity_requested: input.quantity_requested,
                requested_by: actor.user_id,
                project_id: input.project_id,
                purpose: input.purpose,
                occurred_at: now,
            });
            let events = execute(&mut request, &cmd)?;
            tables.commit_spares_request(request.clone(), ExpectedVersion::Exact(0), &events)?;
            Ok(request)
        })?;

        tracing::info!(request_id = %request_id, request_number = %request_number, "spares request created");
        let item_name = request.item().map(|i| i.name.as_str()).unwrap_or_default();
        self.ctx.notify(NotificationIntent::new(
            Role::Spares,
            "New spares request",
            format!(
                "{request_number}: {} x {item_name} requested",
                request.quantity_requested()
            ),
            SPARES_REQUEST,
            request_id,
        ));
        Ok(request)
    }

    /// Issue `quantity` units against the request.
    ///
    /// The stock debit and the request update commit in the same transaction.
    #[instrument(skip(self, actor, notes), fields(user_id = %actor.user_id), err)]
    pub fn fulfill(
        &self,
        actor: Actor,
        request_id: SparesRequestId,
        quantity: i64,
        notes: Option<String>,
    ) -> ServiceResult<SparesRequest> {
        let now = self.ctx.clock.now();
        let (request, item) = self.ctx.store.write(|tables| {
            let mut request = tables.spares_request(request_id)?.clone();
            let base = request.version();
            let item_id = request.inventory_item_id().ok_or_else(|| {
                DomainError::not_found(format!("item of spares request {request_id}"))
            })?;
            let available_stock = tables.inventory_item(item_id)?.current_stock();

            let cmd = SparesCommand::Fulfill(FulfillSparesRequest {
                request_id,
                quantity,
                available_stock,
                fulfilled_by: actor.user_id,
                notes: notes.clone(),
                occurred_at: now,
            });
            let events = execute(&mut request, &cmd)?;
            tables.commit_spares_request(request.clone(), ExpectedVersion::Exact(base), &events)?;

            // One ledger line per issue; the running total keeps the key unique.
            let reference = StockReference::document(ReferenceType::SparesRequest, request_id, actor.user_id)
                .with_line(request.quantity_fulfilled())
                .with_notes(notes);
            let outcome =
                ledger::record_movement(tables, item_id, StockMovement::Remove(quantity), reference, now)?;
            Ok((request, outcome.item))
        })?;

        tracing::info!(
            request_id = %request_id,
            quantity,
            fulfilled = request.quantity_fulfilled(),
            status = %request.status(),
            "spares issued"
        );
        self.ctx.notify_low_stock([&item]);
        Ok(request)
    }

    #[instrument(skip(self, actor, reason), fields(user_id = %actor.user_id), err)]
    pub fn reject(
        &self,
        actor: Actor,
        request_id: SparesRequestId,
        reason: String,
    ) -> ServiceResult<SparesRequest> {
        let cmd = SparesCommand::Reject(RejectSparesRequest {
            request_id,
            rejected_by: actor.user_id,
            reason,
            occurred_at: self.ctx.clock.now(),
        });
        let request = self.ctx.store.write(|tables| {
            let mut request = tables.spares_request(request_id)?.clone();
            let base = request.version();
            let events = execute(&mut request, &cmd)?;
            tables.commit_spares_request(request.clone(), ExpectedVersion::Exact(base), &events)?;
            Ok(request)
        })?;
        tracing::info!(request_id = %request_id, "spares request rejected");
        Ok(request)
    }

    /// Requesters only see their own requests.
    pub fn get(&self, actor: Actor, request_id: SparesRequestId) -> ServiceResult<SparesRequest> {
        self.ctx.store.read(|tables| {
            let request = tables.spares_request(request_id)?;
            ensure_visible(&actor, request)?;
            Ok(request.clone())
        })
    }

    /// Requests visible to `actor`, oldest first.
    pub fn list_for(&self, actor: Actor) -> ServiceResult<Vec<SparesRequest>> {
        self.ctx.store.read(|tables| {
            Ok(tables
                .spares_requests()
                .filter(|r| ensure_visible(&actor, r).is_ok())
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
    use toolroom_spares::SparesRequestStatus;

    #[test]
    fn partial_fulfillment_then_over_issue_fails() {
        let fx = Fixture::new();
        let item = fx.stocked_item("PN-77", 20, 0);
        let requester = actor(Role::Requester);
        let spares = actor(Role::Spares);

        let request = fx
            .engine
            .spares
            .create(
                requester,
                SparesRequestInput {
                    inventory_item_id: item,
                    quantity_requested: 5,
                    project_id: Some(fx.project_id),
                    purpose: Some("Press 4 rebuild".to_string()),
                },
            )
            .unwrap();
        assert_eq!(request.request_number().unwrap().to_string(), "REQ-2024-001");
        assert_eq!(fx.notifier.sent_to(Role::Spares).len(), 1);

        let r = fx.engine.spares.fulfill(spares, request.id_typed(), 3, None).unwrap();
        assert_eq!(r.status(), SparesRequestStatus::PartiallyFulfilled);
        assert_eq!(r.quantity_fulfilled(), 3);

        let r = fx.engine.spares.fulfill(spares, request.id_typed(), 2, None).unwrap();
        assert_eq!(r.status(), SparesRequestStatus::Fulfilled);
        assert_eq!(r.quantity_fulfilled(), 5);

        let err = fx.engine.spares.fulfill(spares, request.id_typed(), 1, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        assert_eq!(fx.engine.inventory.get(item).unwrap().current_stock(), 15);
        assert_eq!(fx.engine.inventory.transactions(item).unwrap().len(), 3);
    }

    #[test]
    fn fulfillment_beyond_stock_names_the_shortfall() {
        let fx = Fixture::new();
        let item = fx.stocked_item("PN-78", 2, 0);
        let request = fx
            .engine
            .spares
            .create(
                actor(Role::Requester),
                SparesRequestInput {
                    inventory_item_id: item,
                    quantity_requested: 5,
                    project_id: None,
                    purpose: None,
                },
            )
            .unwrap();

        let err = fx
            .engine
            .spares
            .fulfill(actor(Role::Spares), request.id_typed(), 3, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("Insufficient stock: requested 3, available 2"));

        let unchanged = fx.engine.spares.get(actor(Role::Admin), request.id_typed()).unwrap();
        assert_eq!(unchanged.quantity_fulfilled(), 0);
        assert_eq!(fx.engine.inventory.get(item).unwrap().current_stock(), 2);
    }

    #[test]
    fn issue_that_leaves_stock_low_notifies_spares() {
        let fx = Fixture::new();
        let item = fx.stocked_item("PN-79", 10, 8);
        let request = fx
            .engine
            .spares
            .create(
                actor(Role::Requester),
                SparesRequestInput {
                    inventory_item_id: item,
                    quantity_requested: 4,
                    project_id: None,
                    purpose: None,
                },
            )
            .unwrap();
        fx.notifier.clear();

        fx.engine
            .spares
            .fulfill(actor(Role::Spares), request.id_typed(), 4, None)
            .unwrap();
        let sent = fx.notifier.sent_to(Role::Spares);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Low stock");
    }

    #[test]
    fn rejected_request_is_closed() {
        let fx = Fixture::new();
        let item = fx.stocked_item("PN-80", 10, 0);
        let request = fx
            .engine
            .spares
            .create(
                actor(Role::Requester),
                SparesRequestInput {
                    inventory_item_id: item,
                    quantity_requested: 1,
                    project_id: None,
                    purpose: None,
                },
            )
            .unwrap();

        let err = fx
            .engine
            .spares
            .reject(actor(Role::Spares), request.id_typed(), "  ".to_string())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        fx.engine
            .spares
            .reject(actor(Role::Spares), request.id_typed(), "obsolete part".to_string())
            .unwrap();
        let err = fx
            .engine
            .spares
            .fulfill(actor(Role::Spares), request.id_typed(), 1, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn requesters_only_see_their_own_requests() {
        let fx = Fixture::new();
        let item = fx.stocked_item("PN-81", 10, 0);
        let alice = actor(Role::Requester);
        let bob = actor(Role::Requester);
        let input = SparesRequestInput {
            inventory_item_id: item,
            quantity_requested: 1,
            project_id: None,
            purpose: None,
        };
        let mine = fx.engine.spares.create(alice, input.clone()).unwrap();
        fx.engine.spares.create(bob, input).unwrap();

        let err = fx.engine.spares.get(bob, mine.id_typed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(fx.engine.spares.list_for(alice).unwrap().len(), 1);
        assert_eq!(fx.engine.spares.list_for(actor(Role::Spares)).unwrap().len(), 2);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .engine
            .spares
            .create(
                actor(Role::Requester),
                SparesRequestInput {
                    inventory_item_id: InventoryItemId::new(),
                    quantity_requested: 1,
                    project_id: None,
                    purpose: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
