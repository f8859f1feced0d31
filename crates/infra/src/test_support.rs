//! Shared fixtures for the service tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use toolroom_core::{
    Actor, InventoryItemId, ProjectId, PurchaseRequisitionId, Role, SupplierId, UserId,
};
use toolroom_events::RecordingNotifier;
use toolroom_inventory::{InventoryKey, StockLevels, StockReference};
use toolroom_purchasing::{CriticalSpareMarker, PrType, PurchaseRequisition, Quotation, QuotationLine};

use crate::clock::FixedClock;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::services::{NewRequisitionItem, QuotationInput, RequisitionInput};
use crate::store::{InMemoryStore, Project, Supplier};

pub(crate) fn actor(role: Role) -> Actor {
    Actor::new(UserId::new(), role)
}

pub(crate) struct Fixture {
    pub engine: Engine<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub project_id: ProjectId,
    /// Rated 4.
    pub supplier_a: SupplierId,
    /// Rated 5.
    pub supplier_b: SupplierId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let engine = Engine::in_memory(config, clock.clone(), notifier.clone());

        let project_id = ProjectId::new();
        engine
            .store()
            .register_project(Project {
                id: project_id,
                code: "PRJ-001".to_string(),
                name: "Stamping line 4".to_string(),
            })
            .unwrap();

        let supplier_a = SupplierId::new();
        let supplier_b = SupplierId::new();
        for (id, name, rating) in [(supplier_a, "Acme Tooling", 4), (supplier_b, "Precision Dies", 5)] {
            engine
                .store()
                .register_supplier(Supplier {
                    id,
                    name: name.to_string(),
                    rating: Some(rating),
                })
                .unwrap();
        }

        Self {
            engine,
            notifier,
            clock,
            project_id,
            supplier_a,
            supplier_b,
        }
    }

    pub fn requisition_input(&self) -> RequisitionInput {
        let item = |code: &str, name: &str, quantity| NewRequisitionItem {
            item_code: code.to_string(),
            name: name.to_string(),
            specification: Some("HSS, 62 HRC".to_string()),
            quantity,
            requirements: None,
            bom_unit_price: Some(1_500),
        };
        RequisitionInput {
            title: "Progressive die spares".to_string(),
            pr_type: PrType::NewSet,
            mod_ref_reason: None,
            items: vec![item("IC-100", "Pierce punch", 4), item("IC-200", "Die button", 6)],
            suppliers: vec![self.supplier_a, self.supplier_b],
            critical_spares: vec![CriticalSpareMarker {
                sequence_number: 2,
                notes: Some("long lead time".to_string()),
            }],
        }
    }

    pub fn submitted_pr(&self) -> PurchaseRequisition {
        self.engine
            .requisitions
            .create(actor(Role::Requester), self.project_id, self.requisition_input())
            .unwrap()
    }

    pub fn pr_in_evaluation(&self) -> PurchaseRequisition {
        let pr = self.submitted_pr();
        let id = pr.id_typed();
        let npd = actor(Role::Npd);
        self.engine
            .requisitions
            .approve(actor(Role::Approver), id, None)
            .unwrap();
        self.engine.requisitions.send_to_suppliers(npd, id).unwrap();
        self.engine.requisitions.begin_evaluation(npd, id).unwrap()
    }

    /// Awarded to supplier A and marked received.
    pub fn received_pr(&self) -> PurchaseRequisition {
        let pr = self.pr_in_evaluation();
        let id = pr.id_typed();
        let npd = actor(Role::Npd);
        let quotation = self.quote(id, self.supplier_a, 30_000);
        self.engine
            .requisitions
            .award(npd, id, self.supplier_a, quotation.id_typed())
            .unwrap();
        self.engine.requisitions.mark_items_received(npd, id).unwrap()
    }

    /// Single-line quotation totalling `total`.
    pub fn quote(&self, pr_id: PurchaseRequisitionId, supplier_id: SupplierId, total: i64) -> Quotation {
        self.engine
            .quotations
            .create(
                actor(Role::Npd),
                QuotationInput {
                    pr_id,
                    supplier_id,
                    lines: vec![QuotationLine {
                        pr_item_id: None,
                        description: "Complete set".to_string(),
                        quantity: 1,
                        unit_price: total,
                    }],
                    delivery_date: None,
                    terms: None,
                },
            )
            .unwrap()
    }

    pub fn stocked_item(&self, part_number: &str, stock: i64, min_stock_level: i64) -> InventoryItemId {
        let item = self
            .engine
            .inventory
            .register_item(
                InventoryKey::new(part_number, "TL-01", None::<&str>).unwrap(),
                "Guide bush",
                StockLevels::new(min_stock_level, None).unwrap(),
            )
            .unwrap();
        if stock > 0 {
            self.engine
                .inventory
                .add_stock(item.id_typed(), stock, StockReference::manual(UserId::new()))
                .unwrap();
        }
        item.id_typed()
    }
}
