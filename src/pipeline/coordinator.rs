use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{ErrorKind, GenerationError, Result},
    logger::RequestTimer,
    models::{find_model, Artifact, GenerationRequest, NewGenerationSet},
    pipeline::{
        batch::{BatchOrchestrator, BatchReport, UnitFailure},
        persister::ArtifactPersister,
    },
    providers::{ProviderAdapter, ProviderRegistry},
    storage::Stores,
    urls::UrlDeriver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Validating,
    SetCreated,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Validating => "validating",
            RequestState::SetCreated => "set_created",
            RequestState::Processing => "processing",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Successful (possibly partial) result of one request.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub set_id: Uuid,
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<UnitFailure>,
}

impl GenerationOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub unit: usize,
    pub reason: String,
}

impl From<&UnitFailure> for FailureSummary {
    fn from(failure: &UnitFailure) -> Self {
        FailureSummary {
            unit: failure.unit,
            reason: failure.error.to_string(),
        }
    }
}

/// Wire shape handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationResponse {
    #[serde(rename_all = "camelCase")]
    Success {
        artifacts: Vec<Artifact>,
        set_id: String,
        failures: Vec<FailureSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Failure { error: String, set_id: String },
}

impl GenerationResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResponse::Success { .. })
    }
}

impl From<Result<GenerationOutcome>> for GenerationResponse {
    fn from(result: Result<GenerationOutcome>) -> Self {
        match result {
            Ok(outcome) => GenerationResponse::Success {
                failures: outcome.failures.iter().map(FailureSummary::from).collect(),
                artifacts: outcome.artifacts,
                set_id: outcome.set_id.to_string(),
            },
            Err(err) => GenerationResponse::Failure {
                error: err.to_string(),
                set_id: String::new(),
            },
        }
    }
}

/// Owns the lifecycle of one request: validate, create the set, run the
/// batch, and clean up when nothing was produced.
#[derive(Clone)]
pub struct RequestCoordinator {
    registry: Arc<ProviderRegistry>,
    stores: Stores,
    batch: BatchOrchestrator,
    request_timeout: Option<Duration>,
}

impl RequestCoordinator {
    pub fn new(registry: Arc<ProviderRegistry>, stores: Stores, urls: UrlDeriver) -> Self {
        let persister =
            ArtifactPersister::new(stores.metadata.clone(), stores.objects.clone(), urls);
        let batch = BatchOrchestrator::new(persister, stores.metadata.clone());
        Self {
            registry,
            stores,
            batch,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Run a request to completion and shape the result for the wire.
    pub async fn generate(&self, user_id: &str, request: GenerationRequest) -> GenerationResponse {
        self.run(user_id, &request, &CancellationToken::new())
            .await
            .into()
    }

    pub async fn run(
        &self,
        user_id: &str,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let timer = RequestTimer::new("generate");
        timer.stage(RequestState::Validating);

        let adapter = match self.validate(request) {
            Ok(adapter) => adapter,
            Err(err) => {
                timer.fail(RequestState::Failed, &err);
                return Err(err);
            }
        };

        let set = match self
            .stores
            .metadata
            .create_set(NewGenerationSet {
                user_id: user_id.to_string(),
                model: request.model.clone(),
                prompt: request.prompt.clone(),
            })
            .await
        {
            Ok(set) => set,
            Err(err) => {
                timer.fail(RequestState::Failed, &err);
                return Err(err);
            }
        };
        timer.stage_with(RequestState::SetCreated, &format!("set {}", set.id));

        timer.stage_with(
            RequestState::Processing,
            &format!("{} x{} on {}", request.model, request.quantity, adapter.provider()),
        );
        let token = cancel.child_token();
        let mut timed_out = None;
        let report = match self.request_timeout {
            Some(limit) => {
                let batch = self.batch.run(adapter.as_ref(), set.id, request, &token);
                tokio::pin!(batch);
                tokio::select! {
                    report = &mut batch => report,
                    _ = tokio::time::sleep(limit) => {
                        log::warn!("Request for set {} exceeded {:?}, cancelling", set.id, limit);
                        timed_out = Some(limit);
                        token.cancel();
                        batch.await
                    }
                }
            }
            None => self.batch.run(adapter.as_ref(), set.id, request, &token).await,
        };

        if !report.is_empty() {
            timer.finish(
                RequestState::Completed,
                &format!(
                    "set {}: {} stored, {} failed",
                    set.id,
                    report.artifacts.len(),
                    report.failures.len()
                ),
            );
            return Ok(GenerationOutcome {
                set_id: set.id,
                artifacts: report.artifacts,
                failures: report.failures,
            });
        }

        match self.stores.metadata.delete_set(set.id).await {
            Ok(_) => log::info!("Deleted empty set {}", set.id),
            Err(e) => log::error!("Failed to delete empty set {}: {}", set.id, e),
        }

        let err = if let Some(limit) = timed_out {
            GenerationError::RequestTimeout(limit)
        } else if cancel.is_cancelled() {
            GenerationError::Cancelled
        } else {
            select_reason(report)
        };
        timer.fail(RequestState::Failed, &err);
        Err(err)
    }

    fn validate(&self, request: &GenerationRequest) -> Result<Arc<dyn ProviderAdapter>> {
        let spec = find_model(&request.model).ok_or_else(|| {
            GenerationError::Validation(format!("Unknown model: {}", request.model))
        })?;
        request.validate(spec)?;
        self.registry.adapter_for(spec.id)
    }
}

/// Pick the single reason surfaced for a batch that produced nothing.
///
/// Moderation beats explicit failures and rejections, which beat
/// not-found, timeout, and transient errors. When only the latter remain
/// and they disagree, the reason is a generic summary.
pub fn select_reason(report: BatchReport) -> GenerationError {
    let attempted = report.attempted();
    let mut failures = report.failures;
    if failures.is_empty() {
        return GenerationError::Cancelled;
    }

    failures.sort_by_key(|f| (f.error.kind().relevance(), f.unit));
    let best = failures[0].error.kind();
    let explicit = best.relevance() <= ErrorKind::Configuration.relevance();
    let uniform = failures.iter().all(|f| f.error.kind() == best);

    if explicit || uniform {
        return failures.swap_remove(0).error;
    }

    failures.sort_by_key(|f| f.unit);
    let summary = failures
        .iter()
        .map(|f| format!("unit {}: {}", f.unit + 1, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    GenerationError::AllUnitsFailed { attempted, summary }
}
