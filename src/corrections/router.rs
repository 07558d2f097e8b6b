//! Correction ingestion router — classifies corrections into urgency tiers.
//!
//! Routing is pure and deterministic: the original prediction's confidence
//! picks the tier, and a `critical_error` reason code overrides everything
//! into the immediate tier. Every tier is durably written; the tier only
//! decides synchronous-vs-batched handling and whether the correction
//! feeds the learning queue.

use serde::{Deserialize, Serialize};

use crate::config::TieringConfig;
use crate::models::{Correction, ReasonCode};

/// Urgency class for a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Processed synchronously, committed at once.
    Immediate,
    /// Accumulated and flushed by size or age, whichever first.
    Batched,
    /// Committed at once but also queued for learning analysis.
    Deferred,
}

/// Classify one correction.
pub fn route(tiering: &TieringConfig, correction: &Correction) -> Tier {
    if correction.reason_code == ReasonCode::CriticalError {
        return Tier::Immediate;
    }

    let confidence = correction.original_prediction.confidence;
    if confidence < tiering.immediate_ceiling {
        Tier::Immediate
    } else if confidence < tiering.batched_ceiling {
        Tier::Batched
    } else {
        Tier::Deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, PredictedField};

    fn tiering() -> TieringConfig {
        TieringConfig {
            immediate_ceiling: 0.5,
            batched_ceiling: 0.8,
        }
    }

    fn correction(confidence: f32, reason: ReasonCode) -> Correction {
        Correction::new(
            "f-1",
            PredictedField {
                name: "Party A".into(),
                field_type: FieldType::Party,
                value: "ACME".into(),
                confidence,
                source_backend: "rules".into(),
                alternatives: vec![],
            },
            "ACME Corp",
            reason,
            "reviewer-1",
        )
    }

    #[test]
    fn low_confidence_routes_immediate() {
        let tier = route(&tiering(), &correction(0.49, ReasonCode::WrongValue));
        assert_eq!(tier, Tier::Immediate);
    }

    #[test]
    fn mid_confidence_routes_batched() {
        assert_eq!(
            route(&tiering(), &correction(0.5, ReasonCode::WrongValue)),
            Tier::Batched
        );
        assert_eq!(
            route(&tiering(), &correction(0.79, ReasonCode::WrongValue)),
            Tier::Batched
        );
    }

    #[test]
    fn high_confidence_routes_deferred() {
        assert_eq!(
            route(&tiering(), &correction(0.8, ReasonCode::WrongValue)),
            Tier::Deferred
        );
        assert_eq!(
            route(&tiering(), &correction(0.95, ReasonCode::WrongValue)),
            Tier::Deferred
        );
    }

    #[test]
    fn critical_error_reason_overrides_confidence() {
        let tier = route(&tiering(), &correction(0.95, ReasonCode::CriticalError));
        assert_eq!(tier, Tier::Immediate);
    }

    #[test]
    fn routing_is_deterministic() {
        let c = correction(0.65, ReasonCode::Formatting);
        for _ in 0..10 {
            assert_eq!(route(&tiering(), &c), Tier::Batched);
        }
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Immediate).unwrap(), "\"immediate\"");
        assert_eq!(serde_json::to_string(&Tier::Batched).unwrap(), "\"batched\"");
        assert_eq!(serde_json::to_string(&Tier::Deferred).unwrap(), "\"deferred\"");
    }
}
