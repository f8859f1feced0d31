//! Spares request domain module.
//!
//! Requests draw on inventory and may be fulfilled in several partial issues.

pub mod request;

pub use request::{
    CreateSparesRequest, FulfillSparesRequest, RejectSparesRequest, RequestedItem, SparesCommand,
    SparesEvent, SparesIssued, SparesRequest, SparesRequestRejected, SparesRequestStatus,
    SparesRequested,
};
