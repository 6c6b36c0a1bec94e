use serde::{Deserialize, Serialize};

/// How a retail source is reached: a plain HTTP API or a scripted scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Scraper,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Api => "api",
            SourceKind::Scraper => "scraper",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product listing mapped out of a source-specific raw shape, normalized
/// for storage and comparison across retailers.
///
/// `(external_id, source)` is the upsert key; `ingredient_id` is the
/// placeholder assignment made at creation time and is never overwritten by
/// later re-fetches of the same listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalProduct {
    /// Source-side item identifier, stored as a string to survive mixed
    /// numeric/string id schemes across retailers.
    pub external_id: String,
    pub name: String,
    /// Canonical unit: `"g"`, `"ml"`, `"unit"`, or the `"kg"` fallback.
    pub unit: String,
    /// Quantity scaled to the canonical unit (grams, millilitres, or count).
    pub quantity: f64,
    pub price: f64,
    /// ISO 4217 currency code (e.g., `"LKR"`).
    pub currency: String,
    /// Product image or page URL, when the source exposes one.
    pub url: Option<String>,
    pub department_code: Option<String>,
    /// Secondary source-side code (SKU/item code), when distinct from the id.
    pub item_code: Option<String>,
    pub is_available: bool,
    /// Ingredient the product is optimistically assigned to at creation.
    pub ingredient_id: i64,
    /// The untouched source payload, kept for audit and re-mapping.
    pub raw: serde_json::Value,
}

impl CanonicalProduct {
    /// Price per canonical unit, or `None` when the quantity is zero or
    /// not finite.
    #[must_use]
    pub fn unit_price(&self) -> Option<f64> {
        if self.quantity > 0.0 && self.quantity.is_finite() {
            Some(self.price / self.quantity)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_product(quantity: f64, price: f64) -> CanonicalProduct {
        CanonicalProduct {
            external_id: "4711".to_string(),
            name: "White Sugar 1kg".to_string(),
            unit: "g".to_string(),
            quantity,
            price,
            currency: "LKR".to_string(),
            url: None,
            department_code: Some("GROC".to_string()),
            item_code: None,
            is_available: true,
            ingredient_id: 1,
            raw: serde_json::json!({"name": "White Sugar 1kg"}),
        }
    }

    #[test]
    fn source_kind_round_trips_through_str() {
        assert_eq!(SourceKind::Api.as_str(), "api");
        assert_eq!(SourceKind::Scraper.as_str(), "scraper");
        assert_eq!(SourceKind::Scraper.to_string(), "scraper");
    }

    #[test]
    fn unit_price_divides_by_quantity() {
        let p = make_product(1000.0, 450.0);
        assert_eq!(p.unit_price(), Some(0.45));
    }

    #[test]
    fn unit_price_none_for_zero_quantity() {
        let p = make_product(0.0, 450.0);
        assert!(p.unit_price().is_none());
    }

    #[test]
    fn serde_round_trips_canonical_product() {
        let p = make_product(1000.0, 450.0);
        let json = serde_json::to_string(&p).expect("serialization failed");
        let decoded: CanonicalProduct = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(decoded.external_id, p.external_id);
        assert_eq!(decoded.quantity, p.quantity);
        assert_eq!(decoded.ingredient_id, p.ingredient_id);
    }
}
