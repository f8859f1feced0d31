use std::collections::HashMap;
use std::sync::Mutex;

use toolroom_core::{DocumentKind, DocumentNumber};

use super::NumberAllocator;
use crate::error::{ServiceResult, StoreError};

/// Remembers the last number issued per stem and increments it under a mutex.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNumberAllocator {
    latest: Mutex<HashMap<(DocumentKind, i32), String>>,
}

impl InMemoryNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `latest` was the most recent number issued for `kind` in `year`.
    ///
    /// The value is stored verbatim, so malformed history can be reproduced.
    pub fn seed(&self, kind: DocumentKind, year: i32, latest: impl Into<String>) -> ServiceResult<()> {
        let mut map = self.latest.lock().map_err(|_| StoreError::Poisoned)?;
        map.insert((kind, year), latest.into());
        Ok(())
    }
}

impl NumberAllocator for InMemoryNumberAllocator {
    fn allocate(&self, kind: DocumentKind, year: i32) -> ServiceResult<DocumentNumber> {
        let mut map = self.latest.lock().map_err(|_| StoreError::Poisoned)?;
        let latest = map.get(&(kind, year)).map(String::as_str);
        let next = DocumentNumber::next_after(kind, year, latest)?;
        map.insert((kind, year), next.to_string());
        tracing::debug!(number = %next, "allocated document number");
        Ok(next)
    }
}
