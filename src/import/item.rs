//! Parsing and validation of one raw import row into an immutable `ParsedItem`.
//!
//! Rows arrive as loosely-typed JSON objects. Nothing downstream of this
//! module ever touches the raw map: either the row parses completely into a
//! `ParsedItem`, or it is rejected with a single descriptive error and none
//! of its fields are applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Medication,
    Parapharmacy,
    Product,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Medication => "medication",
            Category::Parapharmacy => "parapharmacy",
            Category::Product => "product",
        }
    }

    /// Case- and whitespace-insensitive parse.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "medication" => Some(Category::Medication),
            "parapharmacy" => Some(Category::Parapharmacy),
            "product" => Some(Category::Product),
            _ => None,
        }
    }
}

/// Pharmacy-local association lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStatus {
    Active,
    Inactive,
    DiscontinuedLocal,
}

impl AssociationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationStatus::Active => "active",
            AssociationStatus::Inactive => "inactive",
            AssociationStatus::DiscontinuedLocal => "discontinued_local",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "active" => Some(AssociationStatus::Active),
            "inactive" => Some(AssociationStatus::Inactive),
            "discontinued_local" => Some(AssociationStatus::DiscontinuedLocal),
            _ => None,
        }
    }
}

/// One validated import row. Text fields are trimmed; blank strings become
/// `None` so "absent" and "present but empty" collapse to the same thing for
/// catalog fields. The association-level fields (`price`, `notes`,
/// `in_stock`, `status`) keep `Option` as an explicit presence flag: `None`
/// means the key was omitted and the existing association value must not be
/// touched.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub category: Category,
    pub name_el: Option<String>,
    pub name_en: Option<String>,
    pub name_el_norm: Option<String>,
    pub name_en_norm: Option<String>,
    pub desc_el: Option<String>,
    pub desc_en: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub strength: Option<String>,
    pub strength_norm: Option<String>,
    pub form: Option<String>,
    pub form_norm: Option<String>,
    pub active_ingredient_el: Option<String>,
    pub active_ingredient_en: Option<String>,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub in_stock: Option<bool>,
    pub status: Option<AssociationStatus>,
}

/// Lowercase and collapse runs of whitespace; used for the `_norm` shadow
/// fields that drive matching. Handles Greek text via Unicode lowercasing.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn opt_text(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate one raw row. Returns a complete `ParsedItem` or a single error
/// message; an invalid row contributes nothing.
pub fn parse_item(raw: &Value, default_category: Category) -> Result<ParsedItem, String> {
    let map = raw
        .as_object()
        .ok_or_else(|| "item must be a JSON object".to_string())?;

    let category = match map.get("category") {
        None | Some(Value::Null) => default_category,
        Some(Value::String(s)) => Category::parse(s).ok_or_else(|| {
            format!("unknown category {s:?} (expected medication, parapharmacy or product)")
        })?,
        Some(other) => return Err(format!("category must be a string, got {other}")),
    };

    let name_el = opt_text(map, "name_el");
    let name_en = opt_text(map, "name_en");
    let barcode = opt_text(map, "barcode");
    if name_el.is_none() && name_en.is_none() && barcode.is_none() {
        return Err("item needs at least one of name_el, name_en or barcode".to_string());
    }

    let price = match map.get("price") {
        None => None,
        Some(v) => {
            let n = v
                .as_f64()
                .filter(|n| n.is_finite())
                .ok_or_else(|| format!("price must be a number, got {v}"))?;
            if n < 0.0 {
                return Err(format!("price must be >= 0, got {n}"));
            }
            Some(n)
        }
    };

    let in_stock = match map.get("in_stock") {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => return Err(format!("in_stock must be true or false, got {other}")),
    };

    let status = match map.get("association_status") {
        None => None,
        Some(Value::String(s)) => Some(AssociationStatus::parse(s).ok_or_else(|| {
            format!(
                "unknown association_status {s:?} (expected active, inactive or discontinued_local)"
            )
        })?),
        Some(other) => return Err(format!("association_status must be a string, got {other}")),
    };

    // Explicit `null` clears the note; an omitted key leaves it alone.
    let notes = match map.get("notes") {
        None => None,
        Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => return Err(format!("notes must be a string, got {other}")),
    };

    let strength = opt_text(map, "strength");
    let form = opt_text(map, "form");

    Ok(ParsedItem {
        category,
        name_el_norm: name_el.as_deref().map(normalize),
        name_en_norm: name_en.as_deref().map(normalize),
        name_el,
        name_en,
        desc_el: opt_text(map, "desc_el"),
        desc_en: opt_text(map, "desc_en"),
        barcode,
        brand: opt_text(map, "brand"),
        strength_norm: strength.as_deref().map(normalize),
        strength,
        form_norm: form.as_deref().map(normalize),
        form,
        active_ingredient_el: opt_text(map, "active_ingredient_el"),
        active_ingredient_en: opt_text(map, "active_ingredient_en"),
        price,
        notes,
        in_stock,
        status,
    })
}
