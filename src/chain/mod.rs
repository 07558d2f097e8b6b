//! The prediction chain: pluggable backends behind per-backend circuit
//! breakers, a global admission governor, and a fallback orchestrator.

pub mod backends;
pub mod breaker;
pub mod governor;
pub mod orchestrator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::models::{PredictedField, PredictionRequest};

/// A pluggable field-prediction capability.
///
/// The engine knows nothing about what is behind this trait — a rule
/// engine, a local model, or a remote API. Implementations enforce their
/// own per-call timeout (configured via `BackendSpec::timeout_ms`).
pub trait PredictionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, request: &PredictionRequest) -> Result<Vec<PredictedField>, BackendError>;
}

/// Errors a backend call can produce. All of them count as failures for
/// circuit-breaker and retry accounting.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call timed out")]
    Timeout,

    #[error("Backend rate-limited the call")]
    RateLimited,

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Cooperative cancellation flag for an in-flight prediction request.
///
/// Raising it interrupts backoff sleeps and stops the retry loop between
/// attempts. An abandoned attempt touches neither the breaker's success
/// nor its failure counters.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The caller cancelled the prediction request.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Prediction request cancelled")]
pub struct Cancelled;
