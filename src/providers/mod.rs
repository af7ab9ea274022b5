pub mod flux;
pub mod http;
pub mod luma;
pub mod mock;
pub mod titan;
pub mod traits;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::{GenerationError, Result},
    models::{find_model, models_for, ProviderKind},
};

pub use flux::FluxAdapter;
pub use luma::LumaAdapter;
pub use mock::{MockAdapter, MockBehavior};
pub use titan::TitanAdapter;
pub use traits::{JobState, PollStatus, ProviderAdapter, ResultPayload, Submission};

/// Adapters keyed by catalog model id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for every model whose provider is configured.
    /// Providers without credentials are skipped; their models resolve
    /// to a configuration error at request time.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new();
        let call_timeout = config.call_timeout();

        if let Some(bedrock) = &config.bedrock {
            for spec in models_for(ProviderKind::Titan) {
                registry.register(Arc::new(TitanAdapter::new(bedrock, spec, call_timeout).await?));
            }
        }
        if config.flux.api_key.is_some() {
            for spec in models_for(ProviderKind::Flux) {
                registry.register(Arc::new(FluxAdapter::new(&config.flux, spec, call_timeout)?));
            }
        }
        if config.luma.api_key.is_some() {
            for spec in models_for(ProviderKind::Luma) {
                registry.register(Arc::new(LumaAdapter::new(&config.luma, spec, call_timeout)?));
            }
        }

        log::info!("Provider registry ready with {} models", registry.len());
        Ok(registry)
    }

    /// Registry with only the scripted mock behind `mock-provider`.
    pub fn with_mock(adapter: Arc<MockAdapter>) -> Self {
        let mut registry = Self::new();
        registry.register(adapter);
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.model().id;
        if self.adapters.insert(id, adapter).is_some() {
            log::warn!("Replaced adapter for {}", id);
        }
    }

    pub fn adapter_for(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>> {
        let spec = find_model(model)
            .ok_or_else(|| GenerationError::Validation(format!("Unknown model: {}", model)))?;
        self.adapters.get(spec.id).cloned().ok_or_else(|| {
            GenerationError::Configuration(format!(
                "{} provider is not configured for {}",
                spec.provider, spec.id
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FluxConfig, LumaConfig};

    #[tokio::test]
    async fn builds_only_configured_providers() {
        let config = AppConfig::new()
            .with_flux(FluxConfig::new().with_api_key("bfl"))
            .with_luma(LumaConfig::new());
        let registry = ProviderRegistry::from_config(&config).await.unwrap();

        assert_eq!(registry.len(), models_for(ProviderKind::Flux).count());
        assert!(registry.adapter_for("flux-pro-1.1").is_ok());
        assert!(matches!(
            registry.adapter_for("luma-ray-2"),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_model_is_validation_error() {
        let registry = ProviderRegistry::with_mock(Arc::new(MockAdapter::new(vec![])));
        assert!(matches!(
            registry.adapter_for("dall-e-9"),
            Err(GenerationError::Validation(_))
        ));
        assert_eq!(
            registry.adapter_for("mock-provider").unwrap().provider(),
            ProviderKind::Mock
        );
    }
}
