//! Document field schema — the declared shape of fields under management.
//!
//! Loaded at startup alongside the engine configuration. The validator uses
//! it for type-format checks, required-emptiness rules, and cross-field
//! date-ordering constraints.

use serde::{Deserialize, Serialize};

use super::field::FieldType;

/// Declared schema for one managed field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub field_id: String,
    pub name: String,
    pub field_type: FieldType,
}

/// A constraint that one date field must not come after another
/// (e.g. an effective date before its paired termination date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateOrderPair {
    pub earlier_field_id: String,
    pub later_field_id: String,
}

/// All field schemas and cross-field constraints known to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentContext {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub date_pairs: Vec<DateOrderPair>,
}

impl DocumentContext {
    /// Look up a field's declared schema by id.
    pub fn schema(&self, field_id: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    /// Look up a field's schema by display name (case-insensitive).
    pub fn schema_by_name(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Date-order partners of a field: `(partner_id, field_must_be_earlier)`.
    pub fn date_partners(&self, field_id: &str) -> Vec<(&str, bool)> {
        let mut partners = Vec::new();
        for pair in &self.date_pairs {
            if pair.earlier_field_id == field_id {
                partners.push((pair.later_field_id.as_str(), true));
            } else if pair.later_field_id == field_id {
                partners.push((pair.earlier_field_id.as_str(), false));
            }
        }
        partners
    }
}
