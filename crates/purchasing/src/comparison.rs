//! Side-by-side comparison of the quotations received for one requisition.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use toolroom_core::{DomainError, PurchaseRequisitionId, QuotationId, SupplierId};

use crate::quotation::{Quotation, QuotationStatus};

/// One quotation as it appears in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub quotation_id: QuotationId,
    pub quotation_number: String,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    /// Supplier rating 1–5, when the supplier has one.
    pub supplier_rating: Option<u8>,
    pub total_price: i64,
    pub delivery_date: Option<NaiveDate>,
    pub status: QuotationStatus,
}

impl ComparisonEntry {
    pub fn from_quotation(
        quotation: &Quotation,
        supplier_name: impl Into<String>,
        supplier_rating: Option<u8>,
    ) -> Option<Self> {
        Some(Self {
            quotation_id: quotation.id_typed(),
            quotation_number: quotation.quotation_number()?.to_string(),
            supplier_id: quotation.supplier_id()?,
            supplier_name: supplier_name.into(),
            supplier_rating,
            total_price: quotation.total_price(),
            delivery_date: quotation.delivery_date(),
            status: quotation.status(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationComparison {
    pub pr_id: PurchaseRequisitionId,
    pub entries: Vec<ComparisonEntry>,
    pub lowest_price: QuotationId,
    /// `None` when no quotation states a delivery date.
    pub earliest_delivery: Option<QuotationId>,
    /// `None` when no supplier is rated.
    pub highest_rated: Option<QuotationId>,
    /// The lowest-priced quotation.
    pub recommended: QuotationId,
}

/// Rank `entries` (in creation order).
///
/// Ties keep the first entry encountered for every criterion. Fails with `NotFound`
/// when there is nothing to compare.
pub fn compare(
    pr_id: PurchaseRequisitionId,
    entries: Vec<ComparisonEntry>,
) -> Result<QuotationComparison, DomainError> {
    let mut iter = entries.iter();
    let Some(first) = iter.next() else {
        return Err(DomainError::not_found(format!(
            "no quotations for purchase requisition {pr_id}"
        )));
    };

    let mut lowest = first;
    for entry in iter {
        if entry.total_price < lowest.total_price {
            lowest = entry;
        }
    }

    let mut earliest: Option<&ComparisonEntry> = None;
    for entry in &entries {
        let Some(date) = entry.delivery_date else { continue };
        if earliest.and_then(|e| e.delivery_date).is_none_or(|best| date < best) {
            earliest = Some(entry);
        }
    }

    let mut highest: Option<&ComparisonEntry> = None;
    for entry in &entries {
        let Some(rating) = entry.supplier_rating else { continue };
        if highest.and_then(|e| e.supplier_rating).is_none_or(|best| rating > best) {
            highest = Some(entry);
        }
    }

    let lowest_price = lowest.quotation_id;
    let earliest_delivery = earliest.map(|e| e.quotation_id);
    let highest_rated = highest.map(|e| e.quotation_id);

    Ok(QuotationComparison {
        pr_id,
        entries,
        lowest_price,
        earliest_delivery,
        highest_rated,
        recommended: lowest_price,
    })
}
