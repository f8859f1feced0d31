//! Workflow services.
//!
//! Each service validates input, runs the owning aggregate inside one store write and
//! emits notification intents once that write has committed.

pub mod handovers;
pub mod quotations;
pub mod requisitions;
pub mod spares;

pub use handovers::{HandoverInput, HandoverService};
pub use quotations::{QuotationInput, QuotationService};
pub use requisitions::{NewRequisitionItem, RequisitionFilter, RequisitionInput, RequisitionService};
pub use spares::{SparesRequestInput, SparesService};

use std::sync::Arc;

use toolroom_core::{DocumentKind, DocumentNumber, Role};
use toolroom_events::{NotificationIntent, Notifier};
use toolroom_inventory::{InventoryItem, StockStatus};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::ServiceResult;
use crate::numbering::NumberAllocator;

/// Collaborators shared by every service.
pub struct ServiceContext<S> {
    pub(crate) store: Arc<S>,
    pub(crate) numbers: Arc<dyn NumberAllocator>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl<S> Clone for ServiceContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            numbers: self.numbers.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> ServiceContext<S> {
    pub fn new(
        store: Arc<S>,
        numbers: Arc<dyn NumberAllocator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            numbers,
            notifier,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Next number for `kind` in the current year.
    ///
    /// Allocation happens before the write transaction opens, so a failed write leaves a
    /// gap in the sequence.
    pub(crate) fn allocate(&self, kind: DocumentKind) -> ServiceResult<DocumentNumber> {
        self.numbers.allocate(kind, self.clock.year())
    }

    pub(crate) fn notify(&self, intent: NotificationIntent) {
        self.notifier.notify(intent);
    }

    /// Emit a low-stock intent for every item left below its minimum.
    pub(crate) fn notify_low_stock<'a>(&self, items: impl IntoIterator<Item = &'a InventoryItem>) {
        if !self.config.low_stock_notifications {
            return;
        }
        for item in items {
            if item.status() != StockStatus::LowStock {
                continue;
            }
            tracing::info!(
                item_id = %item.id_typed(),
                current_stock = item.current_stock(),
                min_stock_level = item.levels().min_stock_level,
                "inventory item below minimum stock"
            );
            self.notify(NotificationIntent::new(
                Role::Spares,
                "Low stock",
                format!(
                    "{} ({} / {}) is down to {} units, minimum is {}",
                    item.name(),
                    item.part_number(),
                    item.tool_number(),
                    item.current_stock(),
                    item.levels().min_stock_level
                ),
                crate::store::INVENTORY_ITEM,
                item.id_typed(),
            ));
        }
    }
}
