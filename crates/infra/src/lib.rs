//! Infrastructure layer: transactional store, document numbering, the inventory ledger
//! and the workflow services that tie the domain crates together.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod numbering;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{ServiceError, ServiceResult, StoreError};
pub use ledger::{InventoryLedger, StockOutcome};
pub use numbering::{InMemoryNumberAllocator, NumberAllocator, PostgresNumberAllocator};
pub use services::ServiceContext;
pub use store::{InMemoryStore, Project, Supplier, Tables, UnitOfWork};
