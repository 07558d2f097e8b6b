//! Model chain orchestrator — ordered fallback over prediction backends.
//!
//! Walks backends in descending priority. Each metered backend must pass
//! governor admission (denial skips it, it is not an error); each call
//! goes through that backend's circuit breaker with a bounded retry
//! budget and jittered exponential backoff. The chain ends in a free,
//! always-available backend, so `predict` never fails for business
//! reasons — at worst it returns the fallback's output as a last resort.

use std::time::Duration;

use rand::Rng;

use crate::chain::breaker::{CircuitBreaker, CircuitOpen};
use crate::chain::governor::AdmissionGovernor;
use crate::chain::{BackendError, CancelFlag, Cancelled, PredictionBackend};
use crate::config::{BackendSpec, EngineConfig, RetryConfig};
use crate::models::{
    AttemptOutcome, AttemptRecord, PredictedField, PredictionOutcome, PredictionRequest,
};

use thiserror::Error;

/// Slice size for cancellation-responsive backoff sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ChainBuildError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("No backend implementation registered for configured backend {0}")]
    MissingBackend(String),

    #[error("Backend implementation {0} has no matching configuration entry")]
    UnusedBackend(String),
}

struct ChainEntry {
    spec: BackendSpec,
    backend: Box<dyn PredictionBackend>,
    breaker: CircuitBreaker,
}

/// One attempt's failure, for retry accounting.
enum AttemptError {
    Backend(BackendError),
    /// The backend answered but the result failed the plausibility check.
    /// Carries the fields so the final fallback can still be used as a
    /// last resort.
    Implausible(Vec<PredictedField>),
}

pub struct ChainOrchestrator {
    entries: Vec<ChainEntry>,
    governor: AdmissionGovernor,
    retry: RetryConfig,
    min_confidence_floor: f32,
}

impl ChainOrchestrator {
    /// Pair configured backend specs with their implementations, highest
    /// priority first. Every spec needs an implementation and vice versa.
    pub fn new(
        config: &EngineConfig,
        mut backends: Vec<Box<dyn PredictionBackend>>,
    ) -> Result<Self, ChainBuildError> {
        config.validate()?;

        let mut entries = Vec::new();
        for spec in config.backends_by_priority() {
            let position = backends
                .iter()
                .position(|b| b.name() == spec.name)
                .ok_or_else(|| ChainBuildError::MissingBackend(spec.name.clone()))?;
            entries.push(ChainEntry {
                spec: spec.clone(),
                backend: backends.swap_remove(position),
                breaker: CircuitBreaker::new(config.breaker.clone()),
            });
        }
        if let Some(extra) = backends.first() {
            return Err(ChainBuildError::UnusedBackend(extra.name().to_string()));
        }

        Ok(Self {
            entries,
            governor: AdmissionGovernor::new(config.governor.clone()),
            retry: config.retry.clone(),
            min_confidence_floor: config.min_confidence_floor,
        })
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.backend.name()).collect()
    }

    /// Run the fallback chain for one request.
    ///
    /// Never errors for business reasons; the only error is caller-driven
    /// cancellation.
    pub fn predict(
        &self,
        request: &PredictionRequest,
        cancel: &CancelFlag,
    ) -> Result<PredictionOutcome, Cancelled> {
        let mut trace: Vec<AttemptRecord> = Vec::new();
        let mut last_resort: Option<Vec<PredictedField>> = None;
        let fallback_index = self.entries.len().saturating_sub(1);

        for (index, entry) in self.entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            // Metered backends need governor admission covering their whole
            // retry budget. Denial routes us onward, it is not a failure.
            if entry.spec.is_metered() {
                if let Err(denied) = self.governor.admit(entry.spec.cost_per_call) {
                    tracing::info!(
                        backend = entry.backend.name(),
                        %denied,
                        "Admission denied, skipping backend"
                    );
                    trace.push(AttemptRecord {
                        backend: entry.backend.name().to_string(),
                        attempt: 0,
                        outcome: AttemptOutcome::AdmissionSkipped,
                    });
                    continue;
                }
            }

            for attempt in 1..=self.retry.max_attempts {
                if cancel.is_cancelled() {
                    return Err(Cancelled);
                }

                let guarded = entry.breaker.guard(|| self.attempt_call(entry, request));

                match guarded {
                    Err(CircuitOpen) => {
                        tracing::debug!(
                            backend = entry.backend.name(),
                            "Breaker open, moving to next backend"
                        );
                        trace.push(AttemptRecord {
                            backend: entry.backend.name().to_string(),
                            attempt,
                            outcome: AttemptOutcome::CircuitOpen,
                        });
                        // Open breaker consumes no retry budget
                        break;
                    }
                    Ok(Ok(fields)) => {
                        trace.push(AttemptRecord {
                            backend: entry.backend.name().to_string(),
                            attempt,
                            outcome: AttemptOutcome::Succeeded,
                        });
                        tracing::info!(
                            backend = entry.backend.name(),
                            fields = fields.len(),
                            attempts = trace.len(),
                            "Prediction succeeded"
                        );
                        return Ok(PredictionOutcome {
                            fields,
                            attempt_trace: trace,
                        });
                    }
                    Ok(Err(AttemptError::Implausible(fields))) => {
                        trace.push(AttemptRecord {
                            backend: entry.backend.name().to_string(),
                            attempt,
                            outcome: AttemptOutcome::Implausible,
                        });
                        if index == fallback_index {
                            last_resort = Some(fields);
                        }
                    }
                    Ok(Err(AttemptError::Backend(e))) => {
                        let outcome = match &e {
                            BackendError::Timeout => AttemptOutcome::TimedOut,
                            other => AttemptOutcome::Failed {
                                reason: other.to_string(),
                            },
                        };
                        tracing::warn!(
                            backend = entry.backend.name(),
                            attempt,
                            error = %e,
                            "Backend attempt failed"
                        );
                        trace.push(AttemptRecord {
                            backend: entry.backend.name().to_string(),
                            attempt,
                            outcome,
                        });
                    }
                }

                if attempt < self.retry.max_attempts {
                    let delay = self.backoff_delay(attempt);
                    if sleep_cancellable(delay, cancel) {
                        return Err(Cancelled);
                    }
                }
            }
        }

        // Chain exhausted. The fallback is required to be infallible, so
        // even its implausible output beats nothing.
        tracing::warn!("All backends exhausted, returning fallback last resort");
        Ok(PredictionOutcome {
            fields: last_resort.unwrap_or_default(),
            attempt_trace: trace,
        })
    }

    fn attempt_call(
        &self,
        entry: &ChainEntry,
        request: &PredictionRequest,
    ) -> Result<Vec<PredictedField>, AttemptError> {
        let fields = entry
            .backend
            .predict(request)
            .map_err(AttemptError::Backend)?;
        if self.is_plausible(&fields) {
            Ok(fields)
        } else {
            Err(AttemptError::Implausible(fields))
        }
    }

    /// Plausible: at least one field, and something above the floor.
    fn is_plausible(&self, fields: &[PredictedField]) -> bool {
        !fields.is_empty()
            && fields
                .iter()
                .any(|f| f.confidence >= self.min_confidence_floor)
    }

    /// `min(base * 2^(attempt-1), cap)` plus up to 10% uniform jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let exponential = self
            .retry
            .base_delay_ms
            .saturating_mul(1u64 << exponent);
        let capped = exponential.min(self.retry.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.0..0.1) * capped as f64;
        Duration::from_millis(capped + jitter as u64)
    }
}

/// Sleep in short slices so a raised cancel flag interrupts promptly.
/// Returns true if cancelled.
fn sleep_cancellable(total: Duration, cancel: &CancelFlag) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return true;
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::breaker::BreakerState;
    use crate::config::BackendSpec;
    use crate::models::FieldType;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    fn make_field(name: &str, confidence: f32, source: &str) -> PredictedField {
        PredictedField {
            name: name.into(),
            field_type: FieldType::Text,
            value: format!("{name}-value"),
            confidence,
            source_backend: source.into(),
            alternatives: vec![],
        }
    }

    /// Backend that replays a script of results, then repeats the last one.
    struct ScriptedBackend {
        name: String,
        script: Mutex<VecDeque<Result<Vec<PredictedField>, BackendError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(name: &str, script: Vec<Result<Vec<PredictedField>, BackendError>>) -> Self {
            Self {
                name: name.into(),
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn always_failing(name: &str) -> Self {
            Self::new(name, vec![])
        }

        fn always_succeeding(name: &str, confidence: f32) -> Self {
            let field = make_field("Party", confidence, name);
            Self::new(name, vec![Ok(vec![field])])
        }
    }

    impl PredictionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn predict(
            &self,
            _request: &PredictionRequest,
        ) -> Result<Vec<PredictedField>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Err(BackendError::Unavailable("scripted failure".into())),
                1 => clone_result(&script[0]),
                _ => script.pop_front().unwrap(),
            }
        }
    }

    fn clone_result(
        r: &Result<Vec<PredictedField>, BackendError>,
    ) -> Result<Vec<PredictedField>, BackendError> {
        match r {
            Ok(fields) => Ok(fields.clone()),
            Err(BackendError::Timeout) => Err(BackendError::Timeout),
            Err(BackendError::RateLimited) => Err(BackendError::RateLimited),
            Err(BackendError::Unavailable(s)) => Err(BackendError::Unavailable(s.clone())),
            Err(BackendError::Malformed(s)) => Err(BackendError::Malformed(s.clone())),
            Err(BackendError::Http(s)) => Err(BackendError::Http(s.clone())),
        }
    }

    fn spec(name: &str, priority: i32, cost: f64) -> BackendSpec {
        BackendSpec {
            name: name.into(),
            priority,
            cost_per_call: cost,
            timeout_ms: 1_000,
            endpoint: None,
        }
    }

    fn fast_config(backends: Vec<BackendSpec>) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.backends = backends;
        config.retry.max_attempts = 3;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.breaker.failure_threshold = 5;
        config
    }

    #[test]
    fn first_backend_success_stops_the_chain() {
        let config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(ScriptedBackend::always_succeeding("a", 0.9)),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        assert_eq!(outcome.fields[0].source_backend, "a");
        assert_eq!(outcome.attempt_trace.len(), 1);
        assert_eq!(outcome.attempt_trace[0].outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn failing_backend_retries_then_falls_through() {
        let config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        let a = ScriptedBackend::always_failing("a");
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(a),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        assert_eq!(outcome.fields[0].source_backend, "rules");
        // 3 failed attempts on a, then rules succeeds
        let a_attempts = outcome
            .attempt_trace
            .iter()
            .filter(|r| r.backend == "a")
            .count();
        assert_eq!(a_attempts, 3);
        assert_eq!(
            outcome.attempt_trace.last().unwrap().outcome,
            AttemptOutcome::Succeeded
        );
    }

    #[test]
    fn transient_failure_recovers_within_retry_budget() {
        let config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        let a = ScriptedBackend::new(
            "a",
            vec![
                Err(BackendError::Timeout),
                Ok(vec![make_field("Party", 0.9, "a")]),
            ],
        );
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(a),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        assert_eq!(outcome.fields[0].source_backend, "a");
        assert_eq!(outcome.attempt_trace[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(outcome.attempt_trace[1].outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn breaker_opens_mid_retry_and_chain_moves_on() {
        let mut config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        config.breaker.failure_threshold = 2;
        config.retry.max_attempts = 5;

        let a = ScriptedBackend::always_failing("a");
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(a),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        // Two real failures open the breaker; third attempt is a fast
        // circuit_open skip, remaining retry budget unconsumed.
        let a_records: Vec<_> = outcome
            .attempt_trace
            .iter()
            .filter(|r| r.backend == "a")
            .collect();
        assert_eq!(a_records.len(), 3);
        assert_eq!(a_records[2].outcome, AttemptOutcome::CircuitOpen);
        assert_eq!(outcome.fields[0].source_backend, "rules");
    }

    #[test]
    fn open_breaker_skips_backend_on_next_request() {
        let mut config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        config.breaker.failure_threshold = 3;
        config.breaker.recovery_timeout_ms = 60_000;

        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(ScriptedBackend::always_failing("a")),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        // First request burns through a's failures and opens its breaker
        let _ = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();
        assert_eq!(orchestrator.entries[0].breaker.state(), BreakerState::Open);

        // Second request: a is skipped with a single circuit_open record
        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();
        let a_records: Vec<_> = outcome
            .attempt_trace
            .iter()
            .filter(|r| r.backend == "a")
            .collect();
        assert_eq!(a_records.len(), 1);
        assert_eq!(a_records[0].outcome, AttemptOutcome::CircuitOpen);
    }

    #[test]
    fn admission_denied_skips_metered_backend_without_error() {
        let mut config = fast_config(vec![spec("pricey", 10, 5.0), spec("rules", 0, 0.0)]);
        config.governor.max_hourly_cost = 1.0; // pricey can never be admitted

        let pricey = ScriptedBackend::always_succeeding("pricey", 0.95);
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(pricey),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        assert_eq!(outcome.fields[0].source_backend, "rules");
        assert_eq!(
            outcome.attempt_trace[0].outcome,
            AttemptOutcome::AdmissionSkipped
        );
        // The metered backend was never invoked
        assert_eq!(orchestrator.entries[0].breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn implausible_fallback_result_returned_as_last_resort() {
        let config = fast_config(vec![spec("rules", 0, 0.0)]);
        // Fallback answers, but with nothing above the floor
        let rules = ScriptedBackend::new("rules", vec![Ok(vec![make_field("Party", 0.05, "rules")])]);
        let orchestrator = ChainOrchestrator::new(&config, vec![Box::new(rules)]).unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        // Still get the fields, with an all-implausible trace
        assert_eq!(outcome.fields.len(), 1);
        assert!(outcome
            .attempt_trace
            .iter()
            .all(|r| r.outcome == AttemptOutcome::Implausible));
    }

    #[test]
    fn empty_outcome_is_implausible_and_retried() {
        let config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        let a = ScriptedBackend::new("a", vec![Ok(vec![])]);
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(a),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let outcome = orchestrator
            .predict(&PredictionRequest::new("doc"), &CancelFlag::new())
            .unwrap();

        assert_eq!(outcome.fields[0].source_backend, "rules");
        assert!(outcome
            .attempt_trace
            .iter()
            .filter(|r| r.backend == "a")
            .all(|r| r.outcome == AttemptOutcome::Implausible));
    }

    #[test]
    fn pre_cancelled_request_returns_immediately() {
        let config = fast_config(vec![spec("rules", 0, 0.0)]);
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![Box::new(ScriptedBackend::always_succeeding("rules", 0.6))],
        )
        .unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = orchestrator.predict(&PredictionRequest::new("doc"), &cancel);
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn cancellation_interrupts_backoff_sleep() {
        let mut config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        config.retry.base_delay_ms = 2_000;
        config.retry.max_delay_ms = 2_000;

        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(ScriptedBackend::always_failing("a")),
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
            ],
        )
        .unwrap();

        let cancel = CancelFlag::new();
        let canceller = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let start = Instant::now();
        let result = orchestrator.predict(&PredictionRequest::new("doc"), &cancel);
        let elapsed = start.elapsed();

        assert_eq!(result, Err(Cancelled));
        assert!(
            elapsed < Duration::from_millis(1_000),
            "cancel should interrupt the 2s backoff, took {elapsed:?}"
        );
        // Cancelled mid-backoff: the one completed failure was recorded,
        // but the breaker is nowhere near open.
        assert_eq!(orchestrator.entries[0].breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn missing_backend_implementation_is_a_build_error() {
        let config = fast_config(vec![spec("a", 10, 1.0), spec("rules", 0, 0.0)]);
        let result = ChainOrchestrator::new(
            &config,
            vec![Box::new(ScriptedBackend::always_succeeding("rules", 0.6))],
        );
        assert!(matches!(result, Err(ChainBuildError::MissingBackend(_))));
    }

    #[test]
    fn unmatched_backend_implementation_is_a_build_error() {
        let config = fast_config(vec![spec("rules", 0, 0.0)]);
        let result = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
                Box::new(ScriptedBackend::always_succeeding("stray", 0.6)),
            ],
        );
        assert!(matches!(result, Err(ChainBuildError::UnusedBackend(_))));
    }

    #[test]
    fn backend_names_follow_priority_order() {
        let config = fast_config(vec![spec("rules", 0, 0.0), spec("a", 10, 1.0)]);
        let orchestrator = ChainOrchestrator::new(
            &config,
            vec![
                Box::new(ScriptedBackend::always_succeeding("rules", 0.6)),
                Box::new(ScriptedBackend::always_succeeding("a", 0.9)),
            ],
        )
        .unwrap();
        assert_eq!(orchestrator.backend_names(), vec!["a", "rules"]);
    }
}
