//! Conflict resolver — picks a winner among concurrent corrections to the
//! same field.
//!
//! Losing corrections are never discarded: the pipeline logs them as
//! superseded. Under the manual policy nothing is committed and the full
//! conflict set goes back to the caller.

use crate::config::ConflictPolicy;
use crate::models::{ConflictSet, Correction};

/// Result of resolving one conflict set.
#[derive(Debug)]
pub enum ConflictResolution {
    Winner {
        winner: Correction,
        losers: Vec<Correction>,
    },
    /// Manual policy: no winner, a human decides.
    Unresolved(ConflictSet),
}

/// Resolve a conflict set under the given policy.
pub fn resolve(set: ConflictSet, policy: ConflictPolicy) -> ConflictResolution {
    if set.corrections.len() < 2 {
        // Degenerate set; a lone correction trivially wins
        let mut corrections = set.corrections;
        if let Some(winner) = corrections.pop() {
            return ConflictResolution::Winner {
                winner,
                losers: Vec::new(),
            };
        }
        return ConflictResolution::Unresolved(ConflictSet {
            field_id: set.field_id,
            corrections,
        });
    }

    let winner_index = match policy {
        ConflictPolicy::Manual => {
            tracing::info!(
                field_id = set.field_id,
                contenders = set.corrections.len(),
                "Conflict deferred to manual resolution"
            );
            return ConflictResolution::Unresolved(set);
        }
        ConflictPolicy::LatestTimestamp => {
            // Later submission wins; on an exact tie, the later arrival
            let mut best = 0;
            for (i, c) in set.corrections.iter().enumerate() {
                if c.submitted_at >= set.corrections[best].submitted_at {
                    best = i;
                }
            }
            best
        }
        ConflictPolicy::HighestOriginalConfidence => {
            // The prediction least likely to need later revision wins
            let mut best = 0;
            for (i, c) in set.corrections.iter().enumerate() {
                if c.original_prediction.confidence
                    > set.corrections[best].original_prediction.confidence
                {
                    best = i;
                }
            }
            best
        }
    };

    let mut corrections = set.corrections;
    let winner = corrections.swap_remove(winner_index);
    tracing::debug!(
        field_id = set.field_id,
        winner = %winner.id,
        superseded = corrections.len(),
        "Conflict resolved"
    );

    ConflictResolution::Winner {
        winner,
        losers: corrections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, PredictedField, ReasonCode};
    use chrono::{Duration, Utc};

    fn correction(value: &str, confidence: f32, age_secs: i64) -> Correction {
        let mut c = Correction::new(
            "f-1",
            PredictedField {
                name: "Party A".into(),
                field_type: FieldType::Party,
                value: "ACME".into(),
                confidence,
                source_backend: "rules".into(),
                alternatives: vec![],
            },
            value,
            ReasonCode::WrongValue,
            "reviewer-1",
        );
        c.submitted_at = Utc::now() - Duration::seconds(age_secs);
        c
    }

    fn set(corrections: Vec<Correction>) -> ConflictSet {
        ConflictSet {
            field_id: "f-1".into(),
            corrections,
        }
    }

    #[test]
    fn latest_timestamp_picks_newest() {
        let older = correction("older", 0.9, 60);
        let newer = correction("newer", 0.3, 5);
        let resolution = resolve(set(vec![older, newer]), ConflictPolicy::LatestTimestamp);

        match resolution {
            ConflictResolution::Winner { winner, losers } => {
                assert_eq!(winner.corrected_value, "newer");
                assert_eq!(losers.len(), 1);
                assert_eq!(losers[0].corrected_value, "older");
            }
            ConflictResolution::Unresolved(_) => panic!("expected a winner"),
        }
    }

    #[test]
    fn highest_confidence_picks_strongest_original() {
        let weak = correction("weak", 0.4, 5);
        let strong = correction("strong", 0.9, 60);
        let resolution = resolve(
            set(vec![weak, strong]),
            ConflictPolicy::HighestOriginalConfidence,
        );

        match resolution {
            ConflictResolution::Winner { winner, losers } => {
                assert_eq!(winner.corrected_value, "strong");
                assert_eq!(losers[0].corrected_value, "weak");
            }
            ConflictResolution::Unresolved(_) => panic!("expected a winner"),
        }
    }

    #[test]
    fn manual_policy_never_auto_commits() {
        let resolution = resolve(
            set(vec![correction("a", 0.5, 10), correction("b", 0.5, 5)]),
            ConflictPolicy::Manual,
        );
        match resolution {
            ConflictResolution::Unresolved(s) => {
                assert_eq!(s.len(), 2);
                assert_eq!(s.field_id, "f-1");
            }
            ConflictResolution::Winner { .. } => panic!("manual policy must not pick"),
        }
    }

    #[test]
    fn three_way_conflict_keeps_all_losers() {
        let resolution = resolve(
            set(vec![
                correction("first", 0.2, 30),
                correction("second", 0.2, 20),
                correction("third", 0.2, 10),
            ]),
            ConflictPolicy::LatestTimestamp,
        );
        match resolution {
            ConflictResolution::Winner { winner, losers } => {
                assert_eq!(winner.corrected_value, "third");
                assert_eq!(losers.len(), 2);
            }
            ConflictResolution::Unresolved(_) => panic!("expected a winner"),
        }
    }

    #[test]
    fn single_correction_trivially_wins() {
        let resolution = resolve(
            set(vec![correction("only", 0.5, 1)]),
            ConflictPolicy::Manual,
        );
        match resolution {
            ConflictResolution::Winner { winner, losers } => {
                assert_eq!(winner.corrected_value, "only");
                assert!(losers.is_empty());
            }
            ConflictResolution::Unresolved(_) => panic!("lone correction has no conflict"),
        }
    }
}
