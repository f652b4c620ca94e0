//! Response validation: raw model text → [`BillData`].
//!
//! The model is an opaque, non-deterministic oracle, so the rules here are
//! deliberately asymmetric:
//!
//! * **Shape is enforced.** The response must parse as JSON and must be an
//!   object (or a single-element array wrapping one — a shape the service
//!   produces in the wild). Anything else is a `ResponseFormat` failure.
//! * **Content is tolerated.** Every expected key may be absent, spelled
//!   differently ("Vendor Name" / "vendor_name" / "vendor"), or carry a
//!   number where a string was expected. Recognized keys are mapped and
//!   coerced; unrecognized keys are ignored, never errors.
//!
//! Models also wrap JSON in markdown fences despite the JSON response-type
//! constraint, so fences are stripped before parsing — a cheap deterministic
//! fix kept out of the prompt.

use crate::error::BillScanError;
use crate::output::{BillData, LineItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse and validate a raw model response.
pub fn parse_bill_response(raw: &str) -> Result<BillData, BillScanError> {
    let cleaned = strip_fences(raw);
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(BillScanError::ResponseFormat {
            detail: "empty response".into(),
        });
    }

    let value: Value = serde_json::from_str(cleaned).map_err(|e| BillScanError::ResponseFormat {
        detail: e.to_string(),
    })?;

    let object = match value {
        Value::Object(map) => map,
        // The service sometimes answers with `[ { ...bill... } ]`.
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => {
            match items.remove(0) {
                Value::Object(map) => map,
                _ => unreachable!(),
            }
        }
        other => {
            return Err(BillScanError::ResponseFormat {
                detail: format!("expected a JSON object, got {}", json_kind(&other)),
            });
        }
    };

    let mut bill = BillData::default();
    for (key, value) in object {
        match canonical_key(&key) {
            k if VENDOR_KEYS.contains(&k.as_str()) => bill.vendor = coerce_scalar(&value),
            k if DATE_KEYS.contains(&k.as_str()) => bill.date = coerce_scalar(&value),
            k if TOTAL_KEYS.contains(&k.as_str()) => bill.total = coerce_scalar(&value),
            k if TAX_KEYS.contains(&k.as_str()) => {
                if !value.is_null() {
                    bill.tax = Some(value);
                }
            }
            k if CATEGORY_KEYS.contains(&k.as_str()) => bill.category = coerce_scalar(&value),
            k if TYPE_KEYS.contains(&k.as_str()) => bill.expense_type = coerce_scalar(&value),
            k if ITEMS_KEYS.contains(&k.as_str()) => bill.line_items = parse_line_items(&value),
            _ => {} // unrecognized keys are not errors
        }
    }

    Ok(bill)
}

// ── Key recognition ──────────────────────────────────────────────────────

const VENDOR_KEYS: [&str; 5] = ["vendor", "vendorname", "merchant", "merchantname", "storename"];
const DATE_KEYS: [&str; 4] = ["date", "billdate", "invoicedate", "transactiondate"];
const TOTAL_KEYS: [&str; 4] = ["total", "totalamount", "grandtotal", "amountdue"];
const TAX_KEYS: [&str; 6] = ["tax", "taxdetails", "taxes", "gst", "gstdetails", "gsttaxdetails"];
const CATEGORY_KEYS: [&str; 3] = ["category", "expensecategory", "categoryoftheexpense"];
const TYPE_KEYS: [&str; 3] = ["type", "expensetype", "typeoftheexpense"];
const ITEMS_KEYS: [&str; 5] = ["items", "lineitems", "itemizedlist", "itemlist", "itemized"];

/// Collapse a key to lowercase alphanumerics: "Vendor Name" → "vendorname".
fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ── Value coercion ───────────────────────────────────────────────────────

/// Coerce a scalar JSON value to a trimmed string.
///
/// Numbers are rendered verbatim; null, empty strings, and non-scalar
/// shapes count as absent rather than failing the stage.
fn coerce_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Map the itemized-list value into ordered [`LineItem`]s.
///
/// Object entries map by key; bare string entries become description-only
/// items; anything else is skipped.
fn parse_line_items(value: &Value) -> Vec<LineItem> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Object(map) => {
                let mut item = LineItem::default();
                for (key, v) in map {
                    match canonical_key(key).as_str() {
                        "description" | "item" | "itemname" | "name" => {
                            item.description = coerce_scalar(v)
                        }
                        "quantity" | "qty" => item.quantity = coerce_scalar(v),
                        "unitprice" | "price" | "rate" => item.unit_price = coerce_scalar(v),
                        "amount" | "total" | "linetotal" => item.amount = coerce_scalar(v),
                        _ => {}
                    }
                }
                items.push(item);
            }
            Value::String(s) if !s.trim().is_empty() => items.push(LineItem {
                description: Some(s.trim().to_string()),
                ..Default::default()
            }),
            _ => {}
        }
    }
    items
}

// ── Fence stripping ──────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*)\n```\s*$").unwrap());

/// Strip an outer ```json … ``` fence, if present.
fn strip_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_fails_with_response_format() {
        let err = parse_bill_response("not json").unwrap_err();
        assert!(matches!(err, BillScanError::ResponseFormat { .. }));
    }

    #[test]
    fn empty_response_fails() {
        let err = parse_bill_response("   \n ").unwrap_err();
        assert!(matches!(err, BillScanError::ResponseFormat { .. }));
    }

    #[test]
    fn empty_object_succeeds_with_all_fields_absent() {
        let bill = parse_bill_response("{}").unwrap();
        assert!(bill.is_empty());
    }

    #[test]
    fn partial_fields_are_tolerated() {
        let bill = parse_bill_response(r#"{"vendor": "Acme", "total": "42.00"}"#).unwrap();
        assert_eq!(bill.vendor.as_deref(), Some("Acme"));
        assert_eq!(bill.total.as_deref(), Some("42.00"));
        assert!(bill.date.is_none());
        assert!(bill.line_items.is_empty());
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        for raw in [r#""just a string""#, "[1, 2, 3]", "42", "null", "true"] {
            let err = parse_bill_response(raw).unwrap_err();
            assert!(
                matches!(err, BillScanError::ResponseFormat { .. }),
                "payload {raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn single_element_array_is_unwrapped() {
        let bill = parse_bill_response(r#"[{"Vendor Name": "Corner Cafe"}]"#).unwrap();
        assert_eq!(bill.vendor.as_deref(), Some("Corner Cafe"));
    }

    #[test]
    fn verbose_key_spellings_are_recognized() {
        let raw = r#"{
            "Vendor Name": "Big Bazaar",
            "Bill Date": "12/03/25",
            "Total Amount": "1,531.00",
            "GST Details": {"rate": "18%", "amount": "233.54"},
            "Category of the Expense": "Groceries",
            "Type of the Expense": "Household"
        }"#;
        let bill = parse_bill_response(raw).unwrap();
        assert_eq!(bill.vendor.as_deref(), Some("Big Bazaar"));
        assert_eq!(bill.date.as_deref(), Some("12/03/25"));
        assert_eq!(bill.total.as_deref(), Some("1,531.00"));
        assert_eq!(bill.category.as_deref(), Some("Groceries"));
        assert_eq!(bill.expense_type.as_deref(), Some("Household"));
        let tax = bill.tax.unwrap();
        assert_eq!(tax["rate"], "18%");
    }

    #[test]
    fn numeric_values_coerce_to_strings() {
        let bill = parse_bill_response(r#"{"total": 42.5, "date": 20250312}"#).unwrap();
        assert_eq!(bill.total.as_deref(), Some("42.5"));
        assert_eq!(bill.date.as_deref(), Some("20250312"));
    }

    #[test]
    fn null_and_empty_values_count_as_absent() {
        let bill = parse_bill_response(r#"{"vendor": null, "total": "  ", "tax": null}"#).unwrap();
        assert!(bill.is_empty());
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"vendor\": \"Acme\"}\n```";
        let bill = parse_bill_response(raw).unwrap();
        assert_eq!(bill.vendor.as_deref(), Some("Acme"));

        let raw_plain_fence = "```\n{\"total\": \"9.99\"}\n```";
        let bill = parse_bill_response(raw_plain_fence).unwrap();
        assert_eq!(bill.total.as_deref(), Some("9.99"));
    }

    #[test]
    fn line_items_preserve_document_order() {
        let raw = r#"{
            "Itemized List": [
                {"description": "Milk 1L", "quantity": 2, "unit price": "3.50", "amount": "7.00"},
                {"item": "Bread", "qty": "1", "price": 2.00, "total": 2.00},
                "Bag charge"
            ]
        }"#;
        let bill = parse_bill_response(raw).unwrap();
        assert_eq!(bill.line_items.len(), 3);
        assert_eq!(bill.line_items[0].description.as_deref(), Some("Milk 1L"));
        assert_eq!(bill.line_items[0].quantity.as_deref(), Some("2"));
        assert_eq!(bill.line_items[0].unit_price.as_deref(), Some("3.50"));
        assert_eq!(bill.line_items[1].description.as_deref(), Some("Bread"));
        assert_eq!(bill.line_items[1].amount.as_deref(), Some("2.0"));
        assert_eq!(bill.line_items[2].description.as_deref(), Some("Bag charge"));
        assert!(bill.line_items[2].amount.is_none());
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let raw = r#"{"vendor": "Acme", "confidence": 0.93, "notes": ["x"]}"#;
        let bill = parse_bill_response(raw).unwrap();
        assert_eq!(bill.vendor.as_deref(), Some("Acme"));
    }

    #[test]
    fn canonical_key_collapses_spelling() {
        assert_eq!(canonical_key("Vendor Name"), "vendorname");
        assert_eq!(canonical_key("vendor_name"), "vendorname");
        assert_eq!(canonical_key("GST / Tax Details"), "gsttaxdetails");
    }
}
