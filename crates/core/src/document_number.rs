//! Human-readable document numbers (`PR-2024-001`).
//!
//! Numbers are `PREFIX-YYYY-NNN`: an upper-case prefix per document kind, the four-digit
//! year the document was issued in, and a three-digit sequence that restarts at `001`
//! every year.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Highest sequence value representable in the three-digit suffix.
pub const MAX_SEQUENCE: u32 = 999;

/// Kinds of documents that receive a generated number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseRequisition,
    Quotation,
    Handover,
    SparesRequest,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::PurchaseRequisition,
        DocumentKind::Quotation,
        DocumentKind::Handover,
        DocumentKind::SparesRequest,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequisition => "PR",
            DocumentKind::Quotation => "QUOT",
            DocumentKind::Handover => "HAND",
            DocumentKind::SparesRequest => "REQ",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    /// The `PREFIX-YYYY-` stem shared by every number of this kind in `year`.
    pub fn stem(self, year: i32) -> String {
        format!("{}-{:04}-", self.prefix(), year)
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A validated document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    kind: DocumentKind,
    year: i32,
    sequence: u32,
}

impl ValueObject for DocumentNumber {}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, year: i32, sequence: u32) -> DomainResult<Self> {
        if !(0..=9999).contains(&year) {
            return Err(DomainError::bad_request(format!(
                "document year must have four digits (got {year})"
            )));
        }
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return Err(DomainError::bad_request(format!(
                "document sequence must be between 1 and {MAX_SEQUENCE} (got {sequence})"
            )));
        }
        Ok(Self {
            kind,
            year,
            sequence,
        })
    }

    /// First number of the year for `kind`.
    pub fn first(kind: DocumentKind, year: i32) -> DomainResult<Self> {
        Self::new(kind, year, 1)
    }

    /// Compute the number that follows `latest` within the `kind`/`year` stem.
    ///
    /// `latest` is the most recently issued number sharing the stem, if any. When it
    /// cannot be parsed the sequence restarts at `001` and the anomaly is logged; this
    /// never fails on malformed history. Fails with `Conflict` once the year's
    /// three-digit sequence is used up.
    pub fn next_after(kind: DocumentKind, year: i32, latest: Option<&str>) -> DomainResult<Self> {
        let Some(latest) = latest else {
            return Self::first(kind, year);
        };

        let stem = kind.stem(year);
        let parsed = latest
            .strip_prefix(stem.as_str())
            .and_then(|suffix| suffix.parse::<u32>().ok());

        match parsed {
            Some(current) if current >= MAX_SEQUENCE => Err(DomainError::conflict(format!(
                "document sequence {stem}NNN is exhausted"
            ))),
            Some(current) => Self::new(kind, year, current + 1),
            None => {
                tracing::warn!(
                    latest = %latest,
                    stem = %stem,
                    "unparseable latest document number; restarting sequence at 001"
                );
                Self::first(kind, year)
            }
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{:03}", self.kind.stem(self.year), self.sequence)
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    /// Parses `^[A-Z]+-\d{4}-\d{3}$` with a known prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::bad_request(format!("invalid document number: {s}"));

        let mut parts = s.split('-');
        let (Some(prefix), Some(year), Some(seq), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let prefix_ok = !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_uppercase());
        let year_ok = year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit());
        let seq_ok = seq.len() == 3 && seq.bytes().all(|b| b.is_ascii_digit());
        if !(prefix_ok && year_ok && seq_ok) {
            return Err(invalid());
        }

        let kind = DocumentKind::from_prefix(prefix).ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let sequence = seq.parse().map_err(|_| invalid())?;
        Self::new(kind, year, sequence)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}
