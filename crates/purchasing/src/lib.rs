//! Purchasing domain module: purchase requisitions and supplier quotations.
//!
//! Business rules only (no IO, no HTTP, no storage). The requisition lifecycle is
//! driven by the [`PrTransition`] table.

pub mod comparison;
pub mod quotation;
pub mod requisition;

pub use comparison::{ComparisonEntry, QuotationComparison, compare};
pub use quotation::{
    EvaluateQuotation, Quotation, QuotationCommand, QuotationEvent, QuotationItem, QuotationLine,
    QuotationStatus, SubmitQuotation,
};
pub use requisition::{
    AdvanceRequisition, ApproveRequisition, AwardRequisition, CreateRequisition, CriticalSpare,
    CriticalSpareMarker, DeleteRequisition, InvitationStatus, PrItem, PrItemDraft, PrStatus,
    PrSupplier, PrTransition, PrType, PurchaseRequisition, RecordSupplierQuoted,
    RejectRequisition, RequisitionCommand, RequisitionContents, RequisitionDraft,
    RequisitionEvent, UpdateRequisition,
};
