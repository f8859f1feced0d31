//! Domain foundation: ids, aggregates, errors, actors and document numbers.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod actor;
pub mod aggregate;
pub mod document_number;
pub mod error;
pub mod id;
pub mod value_object;

pub use actor::{Actor, Role};
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use document_number::{DocumentKind, DocumentNumber};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    HandoverId, InventoryItemId, PrItemId, ProjectId, PurchaseRequisitionId, QuotationId,
    SparesRequestId, StockTransactionId, SupplierId, UserId,
};
pub use value_object::ValueObject;
