//! Engine configuration — immutable after startup.
//!
//! One `EngineConfig` is built (from defaults, code, or a JSON file) and
//! passed by reference into each component's constructor. There is no
//! global mutable configuration state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate version, surfaced by the health endpoint.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

/// One registered prediction backend, as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Unique backend name; must match a registered `PredictionBackend`.
    pub name: String,
    /// Higher priority is tried first.
    pub priority: i32,
    /// Estimated cost per call, in the operator's cost unit. Zero-cost
    /// backends bypass governor admission — they are the guaranteed path.
    pub cost_per_call: f64,
    /// Per-call timeout for this backend's requests.
    pub timeout_ms: u64,
    /// Remote endpoint URL for HTTP-backed models; `None` for local backends.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl BackendSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Metered backends go through governor admission; free ones do not.
    pub fn is_metered(&self) -> bool {
        self.cost_per_call > 0.0
    }
}

/// Circuit breaker thresholds, shared by every per-backend breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before allowing a probe call.
    pub recovery_timeout_ms: u64,
    /// Consecutive half-open successes before the breaker closes again.
    pub success_threshold: u32,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Bounded-retry parameters for individual backend calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum tries per backend per request (including the first).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Global admission limits across all metered backend calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Maximum admissions inside any trailing 60-second window.
    pub requests_per_minute: u32,
    /// Maximum accumulated estimated cost per hour bucket.
    pub max_hourly_cost: f64,
}

/// Confidence ceilings that split corrections into urgency tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieringConfig {
    /// Original-prediction confidence below this routes to the immediate tier.
    pub immediate_ceiling: f32,
    /// Confidence in `[immediate_ceiling, batched_ceiling)` routes to the
    /// batched tier; at or above it, to the deferred tier.
    pub batched_ceiling: f32,
}

/// Batched-tier accumulation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush as soon as this many corrections are queued.
    pub max_batch_size: usize,
    /// Flush when the oldest queued correction has waited this long.
    pub max_wait_ms: u64,
}

impl BatchConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// How concurrent corrections for the same field are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The newest correction wins.
    LatestTimestamp,
    /// The correction whose original prediction had the highest confidence
    /// wins.
    HighestOriginalConfidence,
    /// Never auto-resolve; surface the conflict set to a human.
    Manual,
}

// ═══════════════════════════════════════════════════════════
// EngineConfig
// ═══════════════════════════════════════════════════════════

/// Complete engine configuration. Static for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub backends: Vec<BackendSpec>,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub governor: GovernorConfig,
    pub tiering: TieringConfig,
    pub batching: BatchConfig,
    pub conflict_policy: ConflictPolicy,
    /// An outcome is implausible unless some field reaches this confidence.
    pub min_confidence_floor: f32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no backends configured")]
    NoBackends,

    #[error("duplicate backend name: {0}")]
    DuplicateBackend(String),

    #[error("the lowest-priority backend must be zero-cost (got {name}: {cost})")]
    NoFreeFallback { name: String, cost: f64 },

    #[error("tiering ceilings must satisfy 0 < immediate < batched <= 1 (got {immediate}, {batched})")]
    BadTiering { immediate: f32, batched: f32 },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("min_confidence_floor must be in [0, 1] (got {0})")]
    BadConfidenceFloor(f32),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendSpec {
                name: "rules".into(),
                priority: 0,
                cost_per_call: 0.0,
                timeout_ms: 5_000,
                endpoint: None,
            }],
            breaker: BreakerConfig {
                failure_threshold: 5,
                recovery_timeout_ms: 30_000,
                success_threshold: 2,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 200,
                max_delay_ms: 5_000,
            },
            governor: GovernorConfig {
                requests_per_minute: 60,
                max_hourly_cost: 50.0,
            },
            tiering: TieringConfig {
                immediate_ceiling: 0.5,
                batched_ceiling: 0.8,
            },
            batching: BatchConfig {
                max_batch_size: 25,
                max_wait_ms: 30_000,
            },
            conflict_policy: ConflictPolicy::LatestTimestamp,
            min_confidence_floor: 0.2,
        }
    }
}

impl EngineConfig {
    /// Check internal consistency. Called once at engine construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        for (i, spec) in self.backends.iter().enumerate() {
            if self.backends[..i].iter().any(|s| s.name == spec.name) {
                return Err(ConfigError::DuplicateBackend(spec.name.clone()));
            }
        }

        // The chain must terminate with a guaranteed-available free backend.
        let last = self
            .backends
            .iter()
            .min_by_key(|s| s.priority)
            .ok_or(ConfigError::NoBackends)?;
        if last.is_metered() {
            return Err(ConfigError::NoFreeFallback {
                name: last.name.clone(),
                cost: last.cost_per_call,
            });
        }

        let t = &self.tiering;
        if !(t.immediate_ceiling > 0.0
            && t.immediate_ceiling < t.batched_ceiling
            && t.batched_ceiling <= 1.0)
        {
            return Err(ConfigError::BadTiering {
                immediate: t.immediate_ceiling,
                batched: t.batched_ceiling,
            });
        }

        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::MustBePositive {
                field: "breaker.failure_threshold",
            });
        }
        if self.breaker.success_threshold == 0 {
            return Err(ConfigError::MustBePositive {
                field: "breaker.success_threshold",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::MustBePositive {
                field: "retry.max_attempts",
            });
        }
        if self.governor.requests_per_minute == 0 {
            return Err(ConfigError::MustBePositive {
                field: "governor.requests_per_minute",
            });
        }
        if self.governor.max_hourly_cost <= 0.0 {
            return Err(ConfigError::MustBePositive {
                field: "governor.max_hourly_cost",
            });
        }
        if self.batching.max_batch_size == 0 {
            return Err(ConfigError::MustBePositive {
                field: "batching.max_batch_size",
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence_floor) {
            return Err(ConfigError::BadConfidenceFloor(self.min_confidence_floor));
        }

        Ok(())
    }

    /// Backends in descending priority order (the order the chain tries them).
    pub fn backends_by_priority(&self) -> Vec<&BackendSpec> {
        let mut specs: Vec<&BackendSpec> = self.backends.iter().collect();
        specs.sort_by(|a, b| b.priority.cmp(&a.priority));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_backend_list() {
        let mut config = EngineConfig::default();
        config.backends.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoBackends)));
    }

    #[test]
    fn rejects_duplicate_backend_names() {
        let mut config = EngineConfig::default();
        let mut dup = config.backends[0].clone();
        dup.priority = 10;
        config.backends.push(dup);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateBackend(_))
        ));
    }

    #[test]
    fn rejects_metered_final_fallback() {
        let mut config = EngineConfig::default();
        config.backends[0].cost_per_call = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoFreeFallback { .. })
        ));
    }

    #[test]
    fn rejects_inverted_tiering_ceilings() {
        let mut config = EngineConfig::default();
        config.tiering.immediate_ceiling = 0.9;
        config.tiering.batched_ceiling = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::BadTiering { .. })));
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MustBePositive { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_confidence_floor() {
        let mut config = EngineConfig::default();
        config.min_confidence_floor = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadConfidenceFloor(_))
        ));
    }

    #[test]
    fn backends_sorted_descending_priority() {
        let mut config = EngineConfig::default();
        config.backends = vec![
            BackendSpec {
                name: "rules".into(),
                priority: 0,
                cost_per_call: 0.0,
                timeout_ms: 5_000,
                endpoint: None,
            },
            BackendSpec {
                name: "remote-large".into(),
                priority: 20,
                cost_per_call: 1.0,
                timeout_ms: 10_000,
                endpoint: Some("http://localhost:9900/predict".into()),
            },
            BackendSpec {
                name: "remote-small".into(),
                priority: 10,
                cost_per_call: 0.2,
                timeout_ms: 10_000,
                endpoint: Some("http://localhost:9901/predict".into()),
            },
        ];
        let names: Vec<&str> = config
            .backends_by_priority()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["remote-large", "remote-small", "rules"]);
    }

    #[test]
    fn conflict_policy_serializes_snake_case() {
        let json = serde_json::to_string(&ConflictPolicy::LatestTimestamp).unwrap();
        assert_eq!(json, "\"latest_timestamp\"");
        let json = serde_json::to_string(&ConflictPolicy::HighestOriginalConfidence).unwrap();
        assert_eq!(json, "\"highest_original_confidence\"");
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.backends.len(), config.backends.len());
        assert_eq!(parsed.conflict_policy, ConflictPolicy::LatestTimestamp);
    }
}
