//! Wiring: one engine value holding every service over a shared context.

use std::sync::Arc;

use toolroom_events::Notifier;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::ledger::InventoryLedger;
use crate::error::ServiceResult;
use crate::numbering::{self, InMemoryNumberAllocator, NumberAllocator};
use crate::services::{
    HandoverService, QuotationService, RequisitionService, ServiceContext, SparesService,
};
use crate::store::{InMemoryStore, UnitOfWork};

pub struct Engine<S> {
    pub requisitions: RequisitionService<S>,
    pub quotations: QuotationService<S>,
    pub handovers: HandoverService<S>,
    pub spares: SparesService<S>,
    pub inventory: InventoryLedger<S>,
    ctx: ServiceContext<S>,
}

impl<S> Engine<S>
where
    S: UnitOfWork,
{
    pub fn new(ctx: ServiceContext<S>) -> Self {
        Self {
            requisitions: RequisitionService::new(ctx.clone()),
            quotations: QuotationService::new(ctx.clone()),
            handovers: HandoverService::new(ctx.clone()),
            spares: SparesService::new(ctx.clone()),
            inventory: InventoryLedger::new(ctx.clone()),
            ctx,
        }
    }

    pub fn with_parts(
        store: Arc<S>,
        numbers: Arc<dyn NumberAllocator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self::new(ServiceContext::new(store, numbers, notifier, clock, config))
    }

    pub fn store(&self) -> &Arc<S> {
        self.ctx.store()
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }
}

impl Engine<InMemoryStore> {
    /// Fully in-memory engine (tests/dev).
    pub fn in_memory(config: EngineConfig, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_parts(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryNumberAllocator::new()),
            notifier,
            clock,
            config,
        )
    }

    /// In-memory store with numbering chosen by `config.database_url`.
    pub fn from_config(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> ServiceResult<Self> {
        let numbers = numbering::from_config(&config)?;
        Ok(Self::with_parts(
            Arc::new(InMemoryStore::new()),
            numbers,
            notifier,
            clock,
            config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use toolroom_core::{DocumentKind, ErrorKind};
    use toolroom_events::RecordingNotifier;

    use crate::clock::FixedClock;
    use crate::error::{ServiceError, StoreError};

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
    }

    #[test]
    fn without_database_url_numbers_come_from_memory() {
        let engine =
            Engine::from_config(EngineConfig::default(), clock(), Arc::new(RecordingNotifier::new()))
                .unwrap();
        let number = engine.ctx.allocate(DocumentKind::PurchaseRequisition).unwrap();
        assert_eq!(number.to_string(), "PR-2024-001");
    }

    #[test]
    fn database_url_selects_postgres_numbering() {
        let config = EngineConfig {
            database_url: Some("not a database url".to_string()),
            ..EngineConfig::default()
        };
        let err = Engine::from_config(config, clock(), Arc::new(RecordingNotifier::new()))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, ServiceError::Store(StoreError::Database { .. })));
    }
}
