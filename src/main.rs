use std::env;
use std::sync::Arc;

use rgenflow::{
    logger::{self, LoggerConfig},
    models::{models_for, ProviderKind},
    providers::{MockAdapter, MockBehavior},
    AppConfig, GenerationRequest, GenerationService, InMemoryLedger, ProviderRegistry,
    RequestCoordinator, Stores, UrlDeriver,
};

const DEMO_USER: &str = "demo-user";
const DEMO_CREDITS: u32 = 200;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    logger::init_with_config(LoggerConfig::from_env())?;
    if dotenv_loaded {
        log::info!(".env file loaded");
    } else {
        log::warn!("No .env file found, using system environment variables");
    }

    let mut args = env::args().skip(1);
    let prompt = args.next().unwrap_or_else(|| "a red fox in fresh snow".to_string());
    let model = args.next().unwrap_or_else(|| "mock-provider".to_string());
    let quantity = match args.next() {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("quantity must be a number, got '{}'", raw))?,
        None => 3,
    };

    let config = AppConfig::from_env();
    log_config(&config);

    let registry = if model == "mock-provider" {
        log::info!("Dry run against the in-process mock provider");
        ProviderRegistry::with_mock(Arc::new(MockAdapter::new(vec![
            MockBehavior::SucceedAfter(2),
            MockBehavior::Immediate,
            MockBehavior::SucceedAfter(3),
        ])))
    } else {
        ProviderRegistry::from_config(&config).await?
    };

    let stores = Stores::from_config(&config).await?;
    let coordinator =
        RequestCoordinator::new(Arc::new(registry), stores, UrlDeriver::new(&config.urls))
            .with_request_timeout(config.request_timeout());
    let ledger = Arc::new(InMemoryLedger::new().with_balance(DEMO_USER, DEMO_CREDITS));
    let service = GenerationService::new(coordinator, ledger.clone(), config.credits);

    let request = GenerationRequest::new(prompt, model).with_quantity(quantity);
    log::info!(
        "Requesting {} x '{}' from {}",
        request.quantity,
        request.prompt,
        request.model
    );

    let response = service.generate(DEMO_USER, request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    log::info!(
        "Remaining demo credits: {}",
        rgenflow::CreditLedger::balance(ledger.as_ref(), DEMO_USER).await?
    );

    if response.is_success() {
        Ok(())
    } else {
        Err("generation failed".into())
    }
}

fn log_config(config: &AppConfig) {
    log::info!("Configuration loaded:");
    log::info!(
        "   Titan (Bedrock): {}",
        if config.bedrock.is_some() { "enabled" } else { "disabled" }
    );
    for (name, kind, key) in [
        ("FLUX", ProviderKind::Flux, &config.flux.api_key),
        ("Luma", ProviderKind::Luma, &config.luma.api_key),
    ] {
        let models: Vec<_> = models_for(kind).map(|m| m.id).collect();
        log::info!(
            "   {}: {} ({})",
            name,
            if key.is_some() { "enabled" } else { "disabled" },
            models.join(", ")
        );
    }
    log::info!(
        "   PostgreSQL: {}",
        if config.postgres.is_some() { "enabled" } else { "in-memory" }
    );
    log::info!("   Provider call timeout: {:?}", config.call_timeout());
    if let Some(limit) = config.request_timeout() {
        log::info!("   Request timeout: {:?}", limit);
    }
}
