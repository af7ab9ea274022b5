pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod polling;
pub mod providers;
pub mod storage;
pub mod urls;

pub use config::{AppConfig, CreditPolicy, PartialCharge};
pub use error::{ErrorKind, GenerationError, Result};
pub use models::{
    find_model, Artifact, GenerationRequest, GenerationSet, GenerationTask, MediaKind, ModelSpec,
    TaskOutcome,
};
pub use pipeline::{
    CreditLedger, GenerationOutcome, GenerationResponse, GenerationService, InMemoryLedger,
    RequestCoordinator,
};
pub use polling::PollConfig;
pub use providers::{ProviderAdapter, ProviderRegistry};
pub use storage::{MetadataStore, ObjectStore, Stores};
pub use tokio_util::sync::CancellationToken;
pub use urls::UrlDeriver;
