//! Engine facade — wires the prediction chain, correction pipeline,
//! version store, and background batch flusher together behind one
//! handle that serving layers share via `Arc`.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::chain::orchestrator::{ChainBuildError, ChainOrchestrator};
use crate::chain::{CancelFlag, Cancelled, PredictionBackend};
use crate::config::EngineConfig;
use crate::corrections::{
    BatchFlusher, BatchQueue, CorrectionPipeline, CorrectionReceipt, Disposition, LearningQueue,
};
use crate::db::repository::LoggedCorrection;
use crate::models::{
    Correction, DocumentContext, FieldVersion, PredictionOutcome, PredictionRequest,
    VersionSource,
};
use crate::store::{StoreError, VersionStore};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Chain build error: {0}")]
    Build(#[from] ChainBuildError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub struct Engine {
    orchestrator: ChainOrchestrator,
    pipeline: Arc<CorrectionPipeline>,
    store: Arc<VersionStore>,
    context: DocumentContext,
    flusher: Mutex<Option<BatchFlusher>>,
}

impl Engine {
    /// Build an engine from static configuration, backend implementations,
    /// the field schema, and an opened store. Starts the batch flusher.
    pub fn new(
        config: EngineConfig,
        backends: Vec<Box<dyn PredictionBackend>>,
        context: DocumentContext,
        store: VersionStore,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(store);
        let orchestrator = ChainOrchestrator::new(&config, backends)?;

        let learning = Arc::new(LearningQueue::new());
        let batch_queue = Arc::new(BatchQueue::new(config.batching.clone()));
        let pipeline = Arc::new(CorrectionPipeline::new(
            store.clone(),
            context.clone(),
            &config,
            learning,
            batch_queue.clone(),
        ));

        let flusher = BatchFlusher::start(batch_queue, pipeline.clone());

        tracing::info!(
            backends = ?orchestrator.backend_names(),
            fields = context.fields.len(),
            "Engine initialized"
        );

        Ok(Self {
            orchestrator,
            pipeline,
            store,
            context,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    // ── Prediction path ─────────────────────────────────────

    /// Run the fallback chain. Never fails; the chain's free fallback
    /// guarantees an outcome.
    pub fn predict(&self, request: &PredictionRequest) -> PredictionOutcome {
        match self.predict_cancellable(request, &CancelFlag::new()) {
            Ok(outcome) => outcome,
            // A fresh flag is never raised; satisfy the type anyway
            Err(Cancelled) => PredictionOutcome {
                fields: Vec::new(),
                attempt_trace: Vec::new(),
            },
        }
    }

    /// Run the fallback chain with caller-driven cancellation.
    pub fn predict_cancellable(
        &self,
        request: &PredictionRequest,
        cancel: &CancelFlag,
    ) -> Result<PredictionOutcome, Cancelled> {
        let outcome = self.orchestrator.predict(request, cancel)?;
        self.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Commit predicted values for schema-known fields, so corrections
    /// have original versions to diff against.
    fn record_outcome(&self, outcome: &PredictionOutcome) {
        for field in &outcome.fields {
            let Some(schema) = self.context.schema_by_name(&field.name) else {
                continue;
            };
            if let Err(e) = self.store.append(
                &schema.field_id,
                &field.value,
                field.confidence,
                VersionSource::Prediction,
            ) {
                tracing::error!(
                    field_id = schema.field_id,
                    error = %e,
                    "Failed to record predicted version"
                );
            }
        }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.orchestrator.backend_names()
    }

    // ── Correction path ─────────────────────────────────────

    /// Submit one correction.
    pub fn submit_correction(&self, correction: Correction) -> CorrectionReceipt {
        let id = correction.id;
        self.pipeline
            .submit(vec![correction])
            .pop()
            .unwrap_or(CorrectionReceipt {
                correction_id: id,
                accepted: false,
                issues: Vec::new(),
                tier: None,
                version_id: None,
                disposition: Disposition::Failed,
            })
    }

    /// Submit a batch of corrections; receipts come back in order.
    pub fn submit_corrections(&self, corrections: Vec<Correction>) -> Vec<CorrectionReceipt> {
        self.pipeline.submit(corrections)
    }

    /// Corrections waiting in the batched tier.
    pub fn pending_batch_len(&self) -> usize {
        self.pipeline.batch_queue().len()
    }

    /// Force-commit everything in the batched tier right now.
    pub fn flush_pending_batch(&self) {
        let batch = self.pipeline.batch_queue().drain_all();
        if !batch.is_empty() {
            self.pipeline.commit_batched(batch);
        }
    }

    /// The deferred-tier learning queue.
    pub fn learning(&self) -> &Arc<LearningQueue> {
        self.pipeline.learning()
    }

    // ── Version store ───────────────────────────────────────

    pub fn history(&self, field_id: &str) -> Result<Vec<FieldVersion>, StoreError> {
        self.store.history(field_id)
    }

    pub fn rollback(
        &self,
        field_id: &str,
        target_version_id: Option<i64>,
    ) -> Result<FieldVersion, StoreError> {
        self.store.rollback(field_id, target_version_id)
    }

    pub fn correction_log(&self, field_id: &str) -> Result<Vec<LoggedCorrection>, StoreError> {
        self.store.correction_log(field_id)
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Stop the batch flusher, flushing anything still queued.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.flusher.lock() {
            guard.take(); // Drop joins the thread after a final flush
        }
        tracing::info!("Engine shut down");
    }
}
