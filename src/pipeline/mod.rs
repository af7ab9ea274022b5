pub mod batch;
pub mod coordinator;
pub mod ledger;
pub mod persister;
pub mod service;

pub use batch::{BatchOrchestrator, BatchReport, UnitFailure};
pub use coordinator::{
    select_reason, FailureSummary, GenerationOutcome, GenerationResponse, RequestCoordinator,
    RequestState,
};
pub use ledger::{CreditLedger, InMemoryLedger};
pub use persister::{ArtifactPersister, PersistFailure};
pub use service::GenerationService;
