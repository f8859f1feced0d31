//! Tool handover domain module.
//!
//! A handover records what arrived for an awarded requisition. Items are immutable
//! snapshots of the requisition lines; approval is what turns them into stock.

pub mod handover;

pub use handover::{
    ApproveHandover, CreateHandover, HandoverCommand, HandoverCreated, HandoverEvent,
    HandoverInspected, HandoverItem, HandoverStatus, ReceivedItem, RejectHandover, ToolHandover,
};
