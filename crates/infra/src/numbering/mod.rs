//! Document number allocation (`PREFIX-YYYY-NNN`).
//!
//! Allocation is atomic per `(prefix, year)`. A number handed out to a transaction that
//! later rolls back is not reused, leaving a gap in the sequence.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryNumberAllocator;
pub use postgres::PostgresNumberAllocator;

use std::sync::Arc;

use toolroom_core::{DocumentKind, DocumentNumber};

use crate::config::EngineConfig;
use crate::error::{ServiceResult, StoreError};

pub trait NumberAllocator: Send + Sync {
    fn allocate(&self, kind: DocumentKind, year: i32) -> ServiceResult<DocumentNumber>;
}

impl<N> NumberAllocator for Arc<N>
where
    N: NumberAllocator + ?Sized,
{
    fn allocate(&self, kind: DocumentKind, year: i32) -> ServiceResult<DocumentNumber> {
        (**self).allocate(kind, year)
    }
}

/// Postgres numbering when `config.database_url` is set, in-memory otherwise.
pub fn from_config(config: &EngineConfig) -> Result<Arc<dyn NumberAllocator>, StoreError> {
    match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("document numbering backed by postgres");
            Ok(Arc::new(PostgresNumberAllocator::connect(url)?))
        }
        None => Ok(Arc::new(InMemoryNumberAllocator::new())),
    }
}
