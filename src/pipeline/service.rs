use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::{CreditPolicy, PartialCharge},
    error::{GenerationError, Result},
    models::{find_model, GenerationRequest},
    pipeline::{
        coordinator::{GenerationOutcome, GenerationResponse, RequestCoordinator},
        ledger::CreditLedger,
    },
};

/// Caller-facing entry point: prices a request, charges the ledger, runs
/// the coordinator, and settles credits against what was produced.
#[derive(Clone)]
pub struct GenerationService {
    coordinator: RequestCoordinator,
    ledger: Arc<dyn CreditLedger>,
    policy: CreditPolicy,
}

impl GenerationService {
    pub fn new(
        coordinator: RequestCoordinator,
        ledger: Arc<dyn CreditLedger>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            policy,
        }
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Credits charged up front for a request. Invalid requests have no price.
    pub fn quote(&self, request: &GenerationRequest) -> Result<u32> {
        let spec = find_model(&request.model).ok_or_else(|| {
            GenerationError::Validation(format!("Unknown model: {}", request.model))
        })?;
        request.validate(spec)?;
        spec.cost_per_unit
            .checked_mul(request.quantity)
            .ok_or_else(|| GenerationError::Validation("Requested quantity is too large".into()))
    }

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
        let cost = self.quote(request)?;
        self.ledger.check_and_decrement(user_id, cost).await?;
        log::info!("Charged {} credits to {} for {}", cost, user_id, request.model);

        let result = self.coordinator.run(user_id, request, cancel).await;
        let refund = self.refund_for(request, cost, &result);
        if refund > 0 {
            match self.ledger.refund(user_id, refund).await {
                Ok(()) => log::info!("Refunded {} credits to {}", refund, user_id),
                Err(e) => log::error!("Failed to refund {} credits to {}: {}", refund, user_id, e),
            }
        }
        result
    }

    fn refund_for(
        &self,
        request: &GenerationRequest,
        cost: u32,
        result: &Result<GenerationOutcome>,
    ) -> u32 {
        if !self.policy.refund_on_failure {
            return 0;
        }
        match result {
            Err(_) => cost,
            Ok(outcome) => match self.policy.partial_charge {
                PartialCharge::Requested => 0,
                PartialCharge::PerSuccess => {
                    let per_unit = cost / request.quantity.max(1);
                    let missing = request
                        .quantity
                        .saturating_sub(outcome.artifacts.len() as u32);
                    per_unit * missing
                }
            },
        }
    }
}
