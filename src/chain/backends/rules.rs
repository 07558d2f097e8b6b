//! Rule-based field extraction — the guaranteed-available, zero-cost
//! final fallback of the prediction chain.
//!
//! No network, no model: regex and heuristics over the document text.
//! Confidence is deliberately conservative; rule hits are a floor, not a
//! substitute for a real model. This backend never fails — worst case it
//! returns an empty field list.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chain::{BackendError, PredictionBackend};
use crate::models::{FieldAlternative, FieldType, PredictedField, PredictionRequest};

pub const RULES_BACKEND_NAME: &str = "rules";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?\d{1,3}[-.\s]?\(?\d{2,4}\)?[-.\s]?\d{3,4}[-.\s]?\d{3,4}").expect("phone regex")
});

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date regex"));

static LONG_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4}\b",
    )
    .expect("long date regex")
});

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?\d[\d,]*(?:\.\d{1,2})?").expect("amount regex"));

static PARTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[A-Z][A-Za-z&'-]*(?:\s+[A-Z][A-Za-z&'-]*){0,4}\s+(?:Inc\.?|LLC|Ltd\.?|Corp\.?|Corporation|Company|GmbH|PLC)\b",
    )
    .expect("party regex")
});

/// Regex/heuristic extractor over raw document text.
pub struct RuleBasedBackend;

impl RuleBasedBackend {
    pub fn new() -> Self {
        Self
    }

    /// Collect all distinct matches of a pattern, in document order.
    fn matches(re: &Regex, text: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for m in re.find_iter(text) {
            let value = m.as_str().to_string();
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        seen
    }

    /// Turn a match list into one field; extra matches become alternatives.
    fn to_field(
        name: &str,
        field_type: FieldType,
        confidence: f32,
        matches: Vec<String>,
    ) -> Option<PredictedField> {
        let mut iter = matches.into_iter();
        let value = iter.next()?;
        let alternatives = iter
            .map(|value| FieldAlternative {
                value,
                confidence: confidence * 0.8,
            })
            .collect();

        Some(PredictedField {
            name: name.to_string(),
            field_type,
            value,
            confidence,
            source_backend: RULES_BACKEND_NAME.to_string(),
            alternatives,
        })
    }
}

impl Default for RuleBasedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionBackend for RuleBasedBackend {
    fn name(&self) -> &str {
        RULES_BACKEND_NAME
    }

    fn predict(&self, request: &PredictionRequest) -> Result<Vec<PredictedField>, BackendError> {
        let text = &request.document_text;
        let mut fields = Vec::new();

        if request.wants_field("Email") {
            if let Some(field) =
                Self::to_field("Email", FieldType::Email, 0.80, Self::matches(&EMAIL_RE, text))
            {
                fields.push(field);
            }
        }

        if request.wants_field("Date") {
            let mut dates = Self::matches(&ISO_DATE_RE, text);
            dates.extend(Self::matches(&LONG_DATE_RE, text));
            if let Some(field) = Self::to_field("Date", FieldType::Date, 0.70, dates) {
                fields.push(field);
            }
        }

        if request.wants_field("Amount") {
            if let Some(field) =
                Self::to_field("Amount", FieldType::Amount, 0.70, Self::matches(&AMOUNT_RE, text))
            {
                fields.push(field);
            }
        }

        if request.wants_field("Party") {
            if let Some(field) =
                Self::to_field("Party", FieldType::Party, 0.60, Self::matches(&PARTY_RE, text))
            {
                fields.push(field);
            }
        }

        if request.wants_field("Phone") {
            // Phone last: its pattern is the loosest and overlaps digits in
            // dates and amounts already claimed above.
            let claimed: Vec<&str> = fields.iter().map(|f| f.value.as_str()).collect();
            let phones: Vec<String> = Self::matches(&PHONE_RE, text)
                .into_iter()
                .filter(|p| !claimed.iter().any(|c| c.contains(p.as_str())))
                .collect();
            if let Some(field) = Self::to_field("Phone", FieldType::Phone, 0.55, phones) {
                fields.push(field);
            }
        }

        tracing::debug!(fields = fields.len(), "Rule extraction complete");
        Ok(fields)
    }
}
