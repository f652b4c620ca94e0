//! Output types: the extracted bill record and per-run statistics.
//!
//! Every field of [`BillData`] is independently optional — the model may
//! omit any of them — but the container itself is never partially
//! constructed: response validation either yields a complete, well-typed
//! `BillData` or the extract stage fails. Monetary values are kept as the
//! strings the model produced ("₹1,234.00", "42.00"); parsing currency out
//! of them is downstream bookkeeping's job, and coercing here would trade
//! a validated shape for silent lossy guesses.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured data extracted from one bill image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillData {
    /// Vendor / merchant name as printed on the bill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Bill date, verbatim from the document (format varies by vendor).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Grand total, verbatim (may include a currency symbol).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,

    /// Tax / GST breakdown, kept as the model's own structure.
    ///
    /// Tax sub-records vary too much across jurisdictions to type: a flat
    /// amount, a rate/amount pair, or a per-slab breakdown are all valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<serde_json::Value>,

    /// Expense category, when the model infers one (e.g. "Groceries").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Type of expense, when the model infers one (e.g. "Restaurant").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_type: Option<String>,

    /// Itemized entries, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,
}

impl BillData {
    /// True when the model produced no recognizable field at all.
    pub fn is_empty(&self) -> bool {
        self.vendor.is_none()
            && self.date.is_none()
            && self.total.is_none()
            && self.tax.is_none()
            && self.category.is_none()
            && self.expense_type.is_none()
            && self.line_items.is_empty()
    }
}

/// One entry of an itemized bill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Statistics for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Wall-clock duration of the whole run in milliseconds.
    pub total_duration_ms: u64,

    /// Time spent normalizing the image.
    pub normalize_duration_ms: u64,

    /// Time spent in the service call (including retries and backoff).
    pub service_duration_ms: u64,

    /// Prompt tokens reported by the service, when available.
    pub input_tokens: u32,

    /// Completion tokens reported by the service, when available.
    pub output_tokens: u32,

    /// Number of retries the service call needed (0 = first attempt won).
    pub retries: u32,
}

/// Result of a successful extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// The validated bill record.
    pub bill: BillData,

    /// Where the normalized intermediate image was written.
    pub normalized_path: PathBuf,

    /// Run statistics.
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bill_serializes_to_empty_object() {
        let bill = BillData::default();
        assert!(bill.is_empty());
        let json = serde_json::to_string(&bill).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn absent_fields_are_skipped() {
        let bill = BillData {
            vendor: Some("Acme".into()),
            total: Some("42.00".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&bill).unwrap();
        assert!(json.contains("\"vendor\""));
        assert!(json.contains("\"total\""));
        assert!(!json.contains("\"date\""));
        assert!(!json.contains("\"line_items\""));
    }

    #[test]
    fn line_items_round_trip_in_order() {
        let bill = BillData {
            line_items: vec![
                LineItem {
                    description: Some("Milk".into()),
                    amount: Some("3.50".into()),
                    ..Default::default()
                },
                LineItem {
                    description: Some("Bread".into()),
                    amount: Some("2.00".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let json = serde_json::to_string(&bill).unwrap();
        let back: BillData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.line_items.len(), 2);
        assert_eq!(back.line_items[0].description.as_deref(), Some("Milk"));
        assert_eq!(back.line_items[1].description.as_deref(), Some("Bread"));
    }
}
