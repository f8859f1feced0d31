use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use toolroom_core::{
    Aggregate, AggregateRoot, DocumentNumber, DomainError, PrItemId, PurchaseRequisitionId,
    QuotationId, SupplierId, UserId,
};
use toolroom_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotationStatus {
    Pending,
    Selected,
    Rejected,
}

impl core::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            QuotationStatus::Pending => "Pending",
            QuotationStatus::Selected => "Selected",
            QuotationStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// A priced line as submitted by the supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub pr_item_id: Option<PrItemId>,
    pub description: String,
    pub quantity: i64,
    /// Minor units.
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationItem {
    pub line_no: u32,
    pub pr_item_id: Option<PrItemId>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: i64,
}

impl QuotationLine {
    fn price(&self, line_no: u32) -> Result<QuotationItem, DomainError> {
        if self.description.trim().is_empty() {
            return Err(DomainError::bad_request(format!(
                "line {line_no}: description is required"
            )));
        }
        if self.quantity <= 0 {
            return Err(DomainError::bad_request(format!(
                "line {line_no}: quantity must be positive"
            )));
        }
        if self.unit_price < 0 {
            return Err(DomainError::bad_request(format!(
                "line {line_no}: unit price cannot be negative"
            )));
        }
        let total_price = self
            .quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| DomainError::bad_request(format!("line {line_no}: total overflows")))?;

        Ok(QuotationItem {
            line_no,
            pr_item_id: self.pr_item_id,
            description: self.description.trim().to_string(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price,
        })
    }
}

/// Aggregate root: Quotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    id: QuotationId,
    quotation_number: Option<DocumentNumber>,
    pr_id: Option<PurchaseRequisitionId>,
    supplier_id: Option<SupplierId>,
    items: Vec<QuotationItem>,
    total_price: i64,
    delivery_date: Option<NaiveDate>,
    terms: Option<String>,
    status: QuotationStatus,
    evaluated_by: Option<UserId>,
    evaluated_at: Option<DateTime<Utc>>,
    evaluation_notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Quotation {
    pub fn empty(id: QuotationId) -> Self {
        Self {
            id,
            quotation_number: None,
            pr_id: None,
            supplier_id: None,
            items: Vec::new(),
            total_price: 0,
            delivery_date: None,
            terms: None,
            status: QuotationStatus::Pending,
            evaluated_by: None,
            evaluated_at: None,
            evaluation_notes: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuotationId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn quotation_number(&self) -> Option<&DocumentNumber> {
        self.quotation_number.as_ref()
    }

    pub fn pr_id(&self) -> Option<PurchaseRequisitionId> {
        self.pr_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn items(&self) -> &[QuotationItem] {
        &self.items
    }

    /// Sum of the line totals, in minor units.
    pub fn total_price(&self) -> i64 {
        self.total_price
    }

    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    pub fn terms(&self) -> Option<&str> {
        self.terms.as_deref()
    }

    pub fn status(&self) -> QuotationStatus {
        self.status
    }

    pub fn evaluated_by(&self) -> Option<UserId> {
        self.evaluated_by
    }

    pub fn evaluated_at(&self) -> Option<DateTime<Utc>> {
        self.evaluated_at
    }

    pub fn evaluation_notes(&self) -> Option<&str> {
        self.evaluation_notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl AggregateRoot for Quotation {
    type Id = QuotationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitQuotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitQuotation {
    pub quotation_id: QuotationId,
    pub quotation_number: DocumentNumber,
    pub pr_id: PurchaseRequisitionId,
    pub supplier_id: SupplierId,
    pub lines: Vec<QuotationLine>,
    pub delivery_date: Option<NaiveDate>,
    pub terms: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EvaluateQuotation. `decision` must be `Selected` or `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateQuotation {
    pub quotation_id: QuotationId,
    pub decision: QuotationStatus,
    pub evaluated_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotationCommand {
    Submit(SubmitQuotation),
    Evaluate(EvaluateQuotation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationSubmitted {
    pub quotation_id: QuotationId,
    pub quotation_number: DocumentNumber,
    pub pr_id: PurchaseRequisitionId,
    pub supplier_id: SupplierId,
    pub items: Vec<QuotationItem>,
    pub total_price: i64,
    pub delivery_date: Option<NaiveDate>,
    pub terms: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationEvaluated {
    pub quotation_id: QuotationId,
    pub decision: QuotationStatus,
    pub evaluated_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotationEvent {
    Submitted(QuotationSubmitted),
    Evaluated(QuotationEvaluated),
}

impl Event for QuotationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuotationEvent::Submitted(_) => "purchasing.quotation.submitted",
            QuotationEvent::Evaluated(_) => "purchasing.quotation.evaluated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuotationEvent::Submitted(e) => e.occurred_at,
            QuotationEvent::Evaluated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Quotation {
    type Command = QuotationCommand;
    type Event = QuotationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuotationEvent::Submitted(e) => {
                self.id = e.quotation_id;
                self.quotation_number = Some(e.quotation_number.clone());
                self.pr_id = Some(e.pr_id);
                self.supplier_id = Some(e.supplier_id);
                self.items = e.items.clone();
                self.total_price = e.total_price;
                self.delivery_date = e.delivery_date;
                self.terms = e.terms.clone();
                self.status = QuotationStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            QuotationEvent::Evaluated(e) => {
                self.status = e.decision;
                self.evaluated_by = Some(e.evaluated_by);
                self.evaluated_at = Some(e.occurred_at);
                self.evaluation_notes = e.notes.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuotationCommand::Submit(cmd) => self.handle_submit(cmd),
            QuotationCommand::Evaluate(cmd) => self.handle_evaluate(cmd),
        }
    }
}

impl Quotation {
    fn handle_submit(&self, cmd: &SubmitQuotation) -> Result<Vec<QuotationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("quotation {} already exists", self.id)));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::bad_request("a quotation needs at least one item"));
        }

        let items = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| line.price(idx as u32 + 1))
            .collect::<Result<Vec<_>, _>>()?;
        let total_price = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.total_price))
            .ok_or_else(|| DomainError::bad_request("quotation total overflows"))?;

        Ok(vec![QuotationEvent::Submitted(QuotationSubmitted {
            quotation_id: cmd.quotation_id,
            quotation_number: cmd.quotation_number.clone(),
            pr_id: cmd.pr_id,
            supplier_id: cmd.supplier_id,
            items,
            total_price,
            delivery_date: cmd.delivery_date,
            terms: cmd
                .terms
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_evaluate(&self, cmd: &EvaluateQuotation) -> Result<Vec<QuotationEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("quotation {}", self.id)));
        }
        if self.id != cmd.quotation_id {
            return Err(DomainError::bad_request("quotation_id mismatch"));
        }
        if self.status != QuotationStatus::Pending {
            return Err(DomainError::invalid_transition(
                "evaluate quotation",
                "Pending",
                self.status,
            ));
        }
        if cmd.decision == QuotationStatus::Pending {
            return Err(DomainError::bad_request(
                "evaluation outcome must be Selected or Rejected",
            ));
        }

        Ok(vec![QuotationEvent::Evaluated(QuotationEvaluated {
            quotation_id: cmd.quotation_id,
            decision: cmd.decision,
            evaluated_by: cmd.evaluated_by,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
