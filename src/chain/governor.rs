//! Rate/cost governor — global admission control over metered backend calls.
//!
//! One shared ledger tracks a sliding 60-second request window and an
//! hour-bucketed accumulated cost. Check-and-record is a single atomic
//! step under the governor lock, so two concurrent admissions can never
//! both pass a boundary check and then jointly exceed a cap.
//!
//! Denial is not a failure: the orchestrator reads it as "skip metered
//! backends, go to the free fallback".

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::GovernorConfig;

const WINDOW: Duration = Duration::from_secs(60);
const HOUR_SECS: u64 = 3600;

/// Admission was denied. A routing signal, not an error to surface.
#[derive(Debug, Error, PartialEq)]
pub enum AdmissionDenied {
    #[error("Request rate limit reached ({limit}/min)")]
    RateExceeded { limit: u32 },

    #[error("Hourly cost cap would be exceeded ({current:.2} + {requested:.2} > {cap:.2})")]
    CostExceeded {
        current: f64,
        requested: f64,
        cap: f64,
    },
}

/// Receipt for an admitted call. Opaque; holding one means the ledger
/// already accounts for the call.
#[derive(Debug, PartialEq)]
pub struct AdmissionToken {
    pub cost: f64,
}

struct Ledger {
    window: VecDeque<Instant>,
    hour_index: u64,
    hour_cost: f64,
}

/// Global admission governor shared by all chain callers.
pub struct AdmissionGovernor {
    config: GovernorConfig,
    started: Instant,
    ledger: Mutex<Ledger>,
}

impl AdmissionGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            ledger: Mutex::new(Ledger {
                window: VecDeque::new(),
                hour_index: 0,
                hour_cost: 0.0,
            }),
        }
    }

    /// Admit a call of the given estimated cost, recording it atomically.
    pub fn admit(&self, estimated_cost: f64) -> Result<AdmissionToken, AdmissionDenied> {
        let now = Instant::now();
        let mut ledger = match self.ledger.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Drop window entries older than 60 seconds
        while let Some(front) = ledger.window.front() {
            if now.duration_since(*front) >= WINDOW {
                ledger.window.pop_front();
            } else {
                break;
            }
        }

        if ledger.window.len() as u32 >= self.config.requests_per_minute {
            return Err(AdmissionDenied::RateExceeded {
                limit: self.config.requests_per_minute,
            });
        }

        // Roll the hour bucket if we crossed into a new hour
        let hour_index = now.duration_since(self.started).as_secs() / HOUR_SECS;
        if hour_index != ledger.hour_index {
            ledger.hour_index = hour_index;
            ledger.hour_cost = 0.0;
        }

        if ledger.hour_cost + estimated_cost > self.config.max_hourly_cost {
            return Err(AdmissionDenied::CostExceeded {
                current: ledger.hour_cost,
                requested: estimated_cost,
                cap: self.config.max_hourly_cost,
            });
        }

        // Both checks passed: record as part of the same critical section
        ledger.window.push_back(now);
        ledger.hour_cost += estimated_cost;

        Ok(AdmissionToken {
            cost: estimated_cost,
        })
    }

    /// Cost accumulated in the current hour bucket.
    pub fn current_hour_cost(&self) -> f64 {
        self.ledger
            .lock()
            .map(|l| l.hour_cost)
            .unwrap_or(f64::INFINITY)
    }
}
