//! Learning queue — the deferred tier's analysis feed.
//!
//! High-confidence predictions that still attracted human corrections are
//! the interesting ones for model improvement. The queue only collects
//! them; no training happens here. The provenance summary shows operators
//! which backend's predictions draw the most corrections.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Correction;
use uuid::Uuid;

/// One queued analysis entry.
#[derive(Debug, Clone, Serialize)]
pub struct LearningEntry {
    pub correction_id: Uuid,
    pub field_id: String,
    pub source_backend: String,
    pub original_confidence: f32,
    pub enqueued_at: DateTime<Utc>,
}

/// In-memory queue of deferred-tier corrections awaiting analysis.
#[derive(Default)]
pub struct LearningQueue {
    entries: Mutex<Vec<LearningEntry>>,
}

impl LearningQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, correction: &Correction) {
        let entry = LearningEntry {
            correction_id: correction.id,
            field_id: correction.field_id.clone(),
            source_backend: correction.original_prediction.source_backend.clone(),
            original_confidence: correction.original_prediction.confidence,
            enqueued_at: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything queued so far, leaving the queue empty.
    pub fn drain(&self) -> Vec<LearningEntry> {
        self.entries
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    /// Correction counts per source backend, most-corrected first.
    pub fn provenance_summary(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        if let Ok(entries) = self.entries.lock() {
            for entry in entries.iter() {
                *counts.entry(entry.source_backend.clone()).or_default() += 1;
            }
        }
        let mut summary: Vec<(String, usize)> = counts.into_iter().collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary
    }
}
