//! Correction validator — structural and business-rule checks on one
//! proposed correction.
//!
//! Pure: the pipeline fetches any committed sibling values first, so the
//! validator itself touches no storage. Check order: type format,
//! required emptiness, cross-field date ordering, no-op detection.
//! A correction is accepted iff it has zero critical issues; warnings
//! ride along informationally.

use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Correction, DocumentContext, FieldType};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9()\-\s.]{7,24}$").expect("phone regex"));

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("amount regex"));

/// Issue severity. Critical blocks acceptance; warnings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
}

impl Issue {
    fn critical(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            code,
            message: message.into(),
        }
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }
}

/// Outcome of validating one correction.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// Accepted iff there are no critical issues.
    pub fn accepted(&self) -> bool {
        self.issues.iter().all(|i| i.severity != Severity::Critical)
    }
}

/// Validate one correction against the field schema and the latest
/// committed values of its date-order partners.
pub fn validate(
    correction: &Correction,
    context: &DocumentContext,
    committed_siblings: &HashMap<String, String>,
) -> ValidationReport {
    let mut issues = Vec::new();

    let schema = context.schema(&correction.field_id);
    if schema.is_none() {
        issues.push(Issue::warning(
            "UNKNOWN_FIELD",
            format!("No declared schema for field {}", correction.field_id),
        ));
    }
    let field_type = schema
        .map(|s| s.field_type)
        .unwrap_or(FieldType::Text);
    let value = correction.corrected_value.trim();

    // 1. Type-format check (empty values are the emptiness check's job)
    if !value.is_empty() {
        check_format(field_type, value, &mut issues);
    }

    // 2. Emptiness for legally required field types
    if value.is_empty() && field_type.is_legally_required() {
        issues.push(Issue::critical(
            "REQUIRED_FIELD_EMPTY",
            format!("A {field_type} field cannot be corrected to empty"),
        ));
    }

    // 3. Cross-field date ordering against committed sibling versions
    if field_type == FieldType::Date {
        if let Some(date) = parse_date(value) {
            for (partner_id, must_be_earlier) in context.date_partners(&correction.field_id) {
                let Some(partner_value) = committed_siblings.get(partner_id) else {
                    continue;
                };
                let Some(partner_date) = parse_date(partner_value) else {
                    continue;
                };
                let violated = if must_be_earlier {
                    date > partner_date
                } else {
                    date < partner_date
                };
                if violated {
                    issues.push(Issue::critical(
                        "DATE_ORDER_VIOLATION",
                        format!(
                            "{value} conflicts with paired field {partner_id} ({partner_value})"
                        ),
                    ));
                }
            }
        }
    }

    // 4. No-op: correcting to the original prediction changes nothing
    if correction.corrected_value == correction.original_prediction.value {
        issues.push(Issue::warning(
            "NO_OP_CORRECTION",
            "Corrected value equals the original prediction",
        ));
    }

    ValidationReport { issues }
}

fn check_format(field_type: FieldType, value: &str, issues: &mut Vec<Issue>) {
    match field_type {
        FieldType::Email => {
            if !EMAIL_RE.is_match(value) {
                issues.push(Issue::critical(
                    "INVALID_EMAIL",
                    format!("{value} is not a valid email address"),
                ));
            }
        }
        FieldType::Phone => {
            let digits = value.chars().filter(char::is_ascii_digit).count();
            if digits < 7 || !PHONE_RE.is_match(value) {
                issues.push(Issue::critical(
                    "INVALID_PHONE",
                    format!("{value} is not a valid phone number"),
                ));
            }
        }
        FieldType::Date => {
            if parse_date(value).is_none() {
                issues.push(Issue::critical(
                    "INVALID_DATE_FORMAT",
                    format!("{value} is not a recognized date"),
                ));
            }
        }
        FieldType::Amount => {
            let cleaned: String = value
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            if !AMOUNT_RE.is_match(&cleaned) {
                issues.push(Issue::critical(
                    "INVALID_AMOUNT",
                    format!("{value} is not a non-negative currency amount"),
                ));
            }
        }
        FieldType::Checkbox => {
            let normalized = value.to_ascii_lowercase();
            if !matches!(
                normalized.as_str(),
                "true" | "false" | "checked" | "unchecked" | "yes" | "no"
            ) {
                issues.push(Issue::critical(
                    "INVALID_CHECKBOX",
                    format!("{value} is not a checkbox state"),
                ));
            }
        }
        // Free-text types carry no format grammar
        FieldType::Text
        | FieldType::Address
        | FieldType::Party
        | FieldType::Signature
        | FieldType::Select => {}
    }
}

/// Parse the date formats the engine accepts: ISO (`2025-01-15`),
/// RFC 3339, and long form (`January 15, 2025`).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(value, "%B %d, %Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DateOrderPair, FieldSchema, PredictedField, ReasonCode,
    };

    fn context() -> DocumentContext {
        DocumentContext {
            fields: vec![
                FieldSchema {
                    field_id: "party-a".into(),
                    name: "Party A".into(),
                    field_type: FieldType::Party,
                },
                FieldSchema {
                    field_id: "notice-email".into(),
                    name: "Notice Email".into(),
                    field_type: FieldType::Email,
                },
                FieldSchema {
                    field_id: "contract-value".into(),
                    name: "Contract Value".into(),
                    field_type: FieldType::Amount,
                },
                FieldSchema {
                    field_id: "effective".into(),
                    name: "Effective Date".into(),
                    field_type: FieldType::Date,
                },
                FieldSchema {
                    field_id: "termination".into(),
                    name: "Termination Date".into(),
                    field_type: FieldType::Date,
                },
            ],
            date_pairs: vec![DateOrderPair {
                earlier_field_id: "effective".into(),
                later_field_id: "termination".into(),
            }],
        }
    }

    fn correction(field_id: &str, original: &str, corrected: &str) -> Correction {
        Correction::new(
            field_id,
            PredictedField {
                name: field_id.into(),
                field_type: FieldType::Text,
                value: original.into(),
                confidence: 0.8,
                source_backend: "rules".into(),
                alternatives: vec![],
            },
            corrected,
            ReasonCode::WrongValue,
            "reviewer-1",
        )
    }

    fn codes(report: &ValidationReport) -> Vec<&'static str> {
        report.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn clean_correction_is_accepted() {
        let report = validate(
            &correction("party-a", "ACME Corporation", "ACME Corp"),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn empty_party_is_critical() {
        let report = validate(
            &correction("party-a", "ACME Corporation", ""),
            &context(),
            &HashMap::new(),
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["REQUIRED_FIELD_EMPTY"]);
    }

    #[test]
    fn empty_email_is_allowed() {
        // Email is not a legally required type; clearing it is fine
        let report = validate(
            &correction("notice-email", "a@b.com", ""),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
    }

    #[test]
    fn bad_email_grammar_is_critical() {
        let report = validate(
            &correction("notice-email", "a@b.com", "not-an-email"),
            &context(),
            &HashMap::new(),
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["INVALID_EMAIL"]);
    }

    #[test]
    fn amount_accepts_currency_noise() {
        let report = validate(
            &correction("contract-value", "$50,000", "$75,000.50"),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
    }

    #[test]
    fn negative_amount_is_critical() {
        let report = validate(
            &correction("contract-value", "$50,000", "-100"),
            &context(),
            &HashMap::new(),
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["INVALID_AMOUNT"]);
    }

    #[test]
    fn date_accepts_iso_and_long_form() {
        for value in ["2025-01-15", "January 15, 2025"] {
            let report = validate(
                &correction("effective", "2024-01-01", value),
                &context(),
                &HashMap::new(),
            );
            assert!(report.accepted(), "{value} should parse");
        }
    }

    #[test]
    fn unparseable_date_is_critical() {
        let report = validate(
            &correction("effective", "2024-01-01", "sometime next year"),
            &context(),
            &HashMap::new(),
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["INVALID_DATE_FORMAT"]);
    }

    #[test]
    fn effective_after_committed_termination_is_critical() {
        let mut siblings = HashMap::new();
        siblings.insert("termination".to_string(), "2025-06-30".to_string());

        let report = validate(
            &correction("effective", "2024-01-01", "2025-12-01"),
            &context(),
            &siblings,
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["DATE_ORDER_VIOLATION"]);
    }

    #[test]
    fn termination_before_committed_effective_is_critical() {
        let mut siblings = HashMap::new();
        siblings.insert("effective".to_string(), "2025-01-01".to_string());

        let report = validate(
            &correction("termination", "2026-01-01", "2024-06-30"),
            &context(),
            &siblings,
        );
        assert!(!report.accepted());
        assert_eq!(codes(&report), vec!["DATE_ORDER_VIOLATION"]);
    }

    #[test]
    fn date_order_skipped_without_committed_sibling() {
        let report = validate(
            &correction("effective", "2024-01-01", "2099-12-31"),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
    }

    #[test]
    fn no_op_is_warning_not_blocker() {
        let report = validate(
            &correction("party-a", "ACME Corporation", "ACME Corporation"),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
        assert_eq!(codes(&report), vec!["NO_OP_CORRECTION"]);
        assert_eq!(report.issues[0].severity, Severity::Warning);
    }

    #[test]
    fn unknown_field_gets_warning_and_text_rules() {
        let report = validate(
            &correction("mystery-field", "old", "new"),
            &context(),
            &HashMap::new(),
        );
        assert!(report.accepted());
        assert_eq!(codes(&report), vec!["UNKNOWN_FIELD"]);
    }

    #[test]
    fn multiple_issues_accumulate() {
        // No-op AND empty would need empty original; use bad email + no-op
        let mut c = correction("notice-email", "bogus", "bogus");
        c.original_prediction.value = "bogus".into();
        let report = validate(&c, &context(), &HashMap::new());
        assert!(!report.accepted());
        let codes = codes(&report);
        assert!(codes.contains(&"INVALID_EMAIL"));
        assert!(codes.contains(&"NO_OP_CORRECTION"));
    }
}
