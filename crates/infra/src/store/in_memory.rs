use std::sync::RwLock;

use super::{Project, Supplier, Tables, UnitOfWork};
use crate::error::{ServiceResult, StoreError};

/// In-memory transactional store.
///
/// Writers are serialized behind the lock and work on a draft copy of the tables; the
/// draft replaces the committed tables only when the closure succeeds, so a failed
/// operation leaves nothing behind.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_project(&self, project: Project) -> ServiceResult<()> {
        self.write(|tables| {
            tables.upsert_project(project);
            Ok(())
        })
    }

    pub fn register_supplier(&self, supplier: Supplier) -> ServiceResult<()> {
        self.write(|tables| {
            tables.upsert_supplier(supplier);
            Ok(())
        })
    }
}

impl UnitOfWork for InMemoryStore {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> ServiceResult<T>) -> ServiceResult<T> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        f(&tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> ServiceResult<T>) -> ServiceResult<T> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        let mut draft = tables.clone();
        let out = f(&mut draft)?;
        *tables = draft;
        Ok(out)
    }
}
