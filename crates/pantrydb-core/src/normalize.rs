//! Quantity, unit, and price normalization for raw retail listings.
//!
//! Source feeds disagree wildly about how pack sizes are encoded: some put
//! `"2x400g"` in the display name, some carry a bare `quantity` field with a
//! `"KG"` unit, some report `"NO"` or `"EA"` for count-style items. This
//! module folds all of that into the canonical unit set — grams,
//! millilitres, `"unit"` for pieces — working from the display name first
//! and structured fields second.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Canonical quantity and unit derived from a raw listing.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityUnit {
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The raw record carries no display name at all; every quantity
    /// heuristic depends on one, so this record cannot be normalized.
    #[error("raw listing has no name/title field: {snippet}")]
    MissingName { snippet: String },
}

/// Multi-pack pattern in a display name, e.g. `"2x400g"` or `"6 x 330ml"`.
static MULTI_PACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*[x*]\s*(\d+(?:\.\d+)?)\s*(g|kg|ml|l)")
        .expect("multi-pack regex is valid")
});

/// Single quantity-in-name pattern, e.g. `"400g"`, `"1kg"`, `"2 ltr"`, `"6 pack"`.
static QTY_IN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(g|kg|ml|l|ltrs?|pack|pcs|piece|bottle|bag)")
        .expect("quantity regex is valid")
});

/// First decimal number in a price string, after separators are stripped.
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("price regex is valid"));

/// Derives the canonical quantity and unit for a raw listing.
///
/// Priority order:
/// 1. multi-pack pattern in the display name (`count × qty`, scaled);
/// 2. single quantity-in-name pattern (same scaling table; pack/piece/
///    bottle/bag-style units collapse to `"unit"`);
/// 3. structured-field heuristics: a bare or missing unit with a non-zero
///    `quantity` field is assumed to be kilograms and scaled to grams;
///    `"no"`/`"ea"` units collapse to one `"unit"`;
/// 4. final fallback: unit defaults to `"kg"` with the quantity left as
///    computed. This is inconsistent with the grams canonicalization above
///    and is preserved as documented behavior pending clarification.
///
/// # Errors
///
/// Returns [`NormalizeError::MissingName`] when the record has no
/// `name`/`title`/`ItemName` field — the one condition treated as a hard
/// per-record failure.
pub fn normalize_quantity_unit(raw: &Value) -> Result<QuantityUnit, NormalizeError> {
    let name = display_name(raw)
        .ok_or_else(|| NormalizeError::MissingName {
            snippet: snippet(raw),
        })?
        .to_lowercase();

    let mut quantity = 1.0_f64;
    let mut unit = structured_unit(raw);

    if let Some(caps) = MULTI_PACK_RE.captures(&name) {
        let pack_count = captured_f64(&caps, 1);
        let pack_qty = captured_f64(&caps, 2);
        let (q, u) = scale(pack_count * pack_qty, &caps[3].to_lowercase());
        return Ok(QuantityUnit {
            quantity: q,
            unit: u,
        });
    }

    if let Some(caps) = QTY_IN_NAME_RE.captures(&name) {
        let parsed_qty = captured_f64(&caps, 1);
        let parsed_unit = caps[2].to_lowercase();
        let (q, u) = match parsed_unit.as_str() {
            "pack" | "pcs" | "piece" | "bottle" | "bag" => (parsed_qty, "unit".to_string()),
            other => scale(parsed_qty, other),
        };
        return Ok(QuantityUnit {
            quantity: q,
            unit: u,
        });
    }

    // Heuristics for broken structured fields.
    let structured_qty = value_as_f64(raw.get("quantity")).filter(|q| *q != 0.0);
    if (unit == "kg" || unit.is_empty()) && structured_qty.is_some() {
        // A bare quantity with no usable unit is, in practice, kilograms.
        quantity = structured_qty.unwrap_or(1.0) * 1000.0;
        unit = "g".to_string();
    } else if unit == "no" || unit == "ea" {
        quantity = 1.0;
        unit = "unit".to_string();
    }

    // Final fallback when no unit could be determined at all. Note: the
    // quantity is NOT rescaled here, unlike every kg path above.
    if unit.is_empty() {
        unit = "kg".to_string();
    }

    Ok(QuantityUnit { quantity, unit })
}

/// Normalizes a price field to a plain `f64`.
///
/// Numbers pass through unchanged. For strings, comma thousands-separators
/// are removed and the first decimal number is extracted, so a currency
/// prefix never bleeds into the parse (`"Rs.1,400.50"` → `1400.5`).
/// Anything without a number yields `0.0` with a warning; this function
/// never fails.
#[must_use]
pub fn normalize_price(raw: &Value) -> f64 {
    match raw {
        Value::Null => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let without_separators = s.replace(',', "");
            match PRICE_RE
                .find(&without_separators)
                .and_then(|m| m.as_str().parse::<f64>().ok())
            {
                Some(parsed) => parsed,
                None => {
                    tracing::warn!(raw = %s, "normalize_price: failed to parse price");
                    0.0
                }
            }
        }
        other => {
            tracing::warn!(raw = %other, "normalize_price: non-scalar price value");
            0.0
        }
    }
}

/// Scales a name-derived quantity into the canonical unit set:
/// kilograms → grams ×1000, litres → millilitres ×1000, grams and
/// millilitres pass through. Unknown units are passed through verbatim.
fn scale(qty: f64, unit: &str) -> (f64, String) {
    match unit {
        "g" => (qty, "g".to_string()),
        "kg" => (qty * 1000.0, "g".to_string()),
        "ml" => (qty, "ml".to_string()),
        "l" | "ltr" | "ltrs" => (qty * 1000.0, "ml".to_string()),
        other => (qty, other.to_string()),
    }
}

/// The display name a listing was published under, probed across the field
/// names the three sources actually use. Empty strings count as absent.
fn display_name(raw: &Value) -> Option<&str> {
    ["name", "title", "ItemName"]
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// The structured unit field, lowercased; empty string when absent.
///
/// Probed across `unit` and the `uom`/`UOM` spellings so Keells-style rows
/// (`"uom": "NO"`) reach the each/none collapse heuristic.
fn structured_unit(raw: &Value) -> String {
    ["unit", "uom", "UOM"]
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// A numeric field that may arrive as a JSON number or a numeric string.
fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn captured_f64(caps: &regex::Captures<'_>, idx: usize) -> f64 {
    caps.get(idx)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// A short, single-line preview of a raw value for error messages.
fn snippet(raw: &Value) -> String {
    let mut s = raw.to_string();
    if s.len() > 200 {
        s.truncate(200);
        s.push('…');
    }
    s
}
