use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{GenerationError, Result},
    models::{Artifact, GenerationRequest, GenerationTask, TaskOutcome},
    pipeline::persister::ArtifactPersister,
    polling::await_completion,
    providers::{ProviderAdapter, ResultPayload, Submission},
    storage::MetadataStore,
};

/// A unit that produced no artifact. `unit` is the 0-based index in the batch.
#[derive(Debug)]
pub struct UnitFailure {
    pub unit: usize,
    pub error: GenerationError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Stored artifacts, in unit order.
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<UnitFailure>,
    pub tasks: Vec<GenerationTask>,
    /// Set when cancellation stopped the batch before every unit ran.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Some units succeeded and some did not.
    pub fn is_partial(&self) -> bool {
        !self.artifacts.is_empty() && !self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.tasks.len()
    }
}

/// Runs the units of one request one after another, tolerating failures.
#[derive(Clone)]
pub struct BatchOrchestrator {
    persister: ArtifactPersister,
    metadata: Arc<dyn MetadataStore>,
}

impl BatchOrchestrator {
    pub fn new(persister: ArtifactPersister, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            persister,
            metadata,
        }
    }

    pub async fn run(
        &self,
        adapter: &dyn ProviderAdapter,
        set_id: Uuid,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let quantity = request.quantity as usize;
        let mut report = BatchReport::default();

        for unit in 0..quantity {
            if cancel.is_cancelled() {
                log::warn!(
                    "Set {} cancelled; skipping units {}..{}",
                    set_id,
                    unit + 1,
                    quantity
                );
                report.cancelled = true;
                break;
            }

            let mut task = GenerationTask::new(unit);
            match self.run_unit(adapter, set_id, request, &mut task, cancel).await {
                Ok(artifact) => {
                    log::info!(
                        "Unit {}/{} of set {} stored as {}",
                        unit + 1,
                        quantity,
                        set_id,
                        artifact.id()
                    );
                    report.artifacts.push(artifact);
                }
                Err(error) => {
                    log::warn!("Unit {}/{} of set {} failed: {}", unit + 1, quantity, set_id, error);
                    if matches!(error, GenerationError::Cancelled) {
                        report.cancelled = true;
                    }
                    report.failures.push(UnitFailure { unit, error });
                }
            }
            report.tasks.push(task);
        }

        if report.is_partial() {
            log::warn!(
                "Set {} partially completed: {} stored, {} failed",
                set_id,
                report.artifacts.len(),
                report.failures.len()
            );
        }
        report
    }

    async fn run_unit(
        &self,
        adapter: &dyn ProviderAdapter,
        set_id: Uuid,
        request: &GenerationRequest,
        task: &mut GenerationTask,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let unit = task.unit;
        let payload = self.produce(adapter, request, task, cancel).await?;

        match self
            .persister
            .store(set_id, adapter.model().kind, request, unit, payload)
            .await
        {
            Ok(artifact) => Ok(artifact),
            Err(failure) => {
                if let Some(row) = failure.orphaned {
                    if let Err(e) = self.metadata.delete_artifact(row).await {
                        log::error!("Failed to delete orphaned artifact row {}: {}", row, e);
                    }
                }
                Err(failure.error)
            }
        }
    }

    /// Submit, wait, fetch. Leaves the task with the provider job's outcome.
    async fn produce(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &GenerationRequest,
        task: &mut GenerationTask,
        cancel: &CancellationToken,
    ) -> Result<ResultPayload> {
        let submitted = tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            submitted = adapter.submit(request, task.unit) => submitted,
        };

        let job_id = match submitted {
            Ok(Submission::Immediate(payload)) => {
                task.finish(TaskOutcome::Succeeded);
                return Ok(payload);
            }
            Ok(Submission::Job(job_id)) => job_id,
            Err(err) => {
                task.fail_with(&err);
                return Err(err);
            }
        };

        log::debug!("Unit {} submitted as {} job {}", task.unit, adapter.provider(), job_id);
        task.assign_job(job_id.clone());
        let result_ref = await_completion(adapter, &job_id, task, cancel).await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            payload = adapter.fetch_result(&result_ref) => payload,
        }
    }
}
