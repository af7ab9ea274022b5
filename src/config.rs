use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FluxConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct LumaConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local {
        root: PathBuf,
    },
    Supabase {
        url: String,
        service_key: String,
        bucket: String,
    },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone)]
pub struct UrlConfig {
    pub public_base: String,
    pub thumbnail_base: String,
    pub thumbnail_width: u32,
}

/// How much of a charge is kept when a batch only partially succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCharge {
    Requested,
    PerSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPolicy {
    pub refund_on_failure: bool,
    pub partial_charge: PartialCharge,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bedrock: Option<BedrockConfig>,
    pub flux: FluxConfig,
    pub luma: LumaConfig,
    pub postgres: Option<PostgresConfig>,
    pub storage: StorageConfig,
    pub urls: UrlConfig,
    pub credits: CreditPolicy,
    pub call_timeout_secs: u64,
    pub request_timeout_secs: Option<u64>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        BedrockConfig {
            region: None,
            access_key: None,
            secret_key: None,
        }
    }
}

impl BedrockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let region = env::var("AWS_REGION")
            .or_else(|_| env::var("AWS_DEFAULT_REGION"))
            .ok();
        let access_key = env::var("AWS_ACCESS_KEY_ID").ok();
        let secret_key = env::var("AWS_SECRET_ACCESS_KEY").ok();

        BedrockConfig {
            region,
            access_key,
            secret_key,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

impl Default for FluxConfig {
    fn default() -> Self {
        FluxConfig {
            api_key: None,
            base_url: "https://api.bfl.ml/v1".to_string(),
        }
    }
}

impl FluxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = env::var("BFL_API_KEY").ok();
        if let Ok(url) = env::var("BFL_BASE_URL") {
            config.base_url = url;
        }
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for LumaConfig {
    fn default() -> Self {
        LumaConfig {
            api_key: None,
            base_url: "https://api.lumalabs.ai/dream-machine/v1".to_string(),
        }
    }
}

impl LumaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = env::var("LUMA_API_KEY").ok();
        if let Ok(url) = env::var("LUMA_BASE_URL") {
            config.base_url = url;
        }
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        PostgresConfig {
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
        }
    }
}

impl PostgresConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let host = env::var("POSTGRES_HOST").ok();
        let port = env::var("POSTGRES_PORT").ok().and_then(|s| s.parse().ok());
        let username = env::var("POSTGRES_USERNAME").ok();
        let password = env::var("POSTGRES_PASSWORD").ok();
        let database = env::var("POSTGRES_DATABASE").ok();

        PostgresConfig {
            host,
            port,
            username,
            password,
            database,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_connection_info(
        mut self,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self.database = Some(database.into());
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Local {
                root: PathBuf::from("./generated"),
            },
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `STORAGE_BACKEND=supabase` selects the Supabase bucket; anything else
    /// stores under `STORAGE_ROOT` on the local filesystem.
    pub fn from_env() -> Self {
        let backend = match env::var("STORAGE_BACKEND").ok().as_deref() {
            Some("supabase") => StorageBackend::Supabase {
                url: env::var("SUPABASE_URL").unwrap_or_default(),
                service_key: env::var("SUPABASE_SERVICE_KEY").unwrap_or_default(),
                bucket: env::var("SUPABASE_BUCKET").unwrap_or_else(|_| "generations".to_string()),
            },
            _ => StorageBackend::Local {
                root: env::var("STORAGE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./generated")),
            },
        };

        StorageConfig { backend }
    }

    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.backend = StorageBackend::Local { root: root.into() };
        self
    }

    pub fn with_supabase(
        mut self,
        url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        self.backend = StorageBackend::Supabase {
            url: url.into(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        };
        self
    }
}

impl Default for UrlConfig {
    fn default() -> Self {
        UrlConfig {
            public_base: "http://localhost:8080/media".to_string(),
            thumbnail_base: "http://localhost:8080/media".to_string(),
            thumbnail_width: 256,
        }
    }
}

impl UrlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = env::var("MEDIA_PUBLIC_BASE") {
            config.thumbnail_base = base.clone();
            config.public_base = base;
        }
        if let Ok(base) = env::var("MEDIA_THUMBNAIL_BASE") {
            config.thumbnail_base = base;
        }
        if let Some(width) = env::var("MEDIA_THUMBNAIL_WIDTH")
            .ok()
            .and_then(|w| w.parse().ok())
        {
            config.thumbnail_width = width;
        }
        config
    }

    pub fn with_bases(
        mut self,
        public_base: impl Into<String>,
        thumbnail_base: impl Into<String>,
    ) -> Self {
        self.public_base = public_base.into();
        self.thumbnail_base = thumbnail_base.into();
        self
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        CreditPolicy {
            refund_on_failure: true,
            partial_charge: PartialCharge::PerSuccess,
        }
    }
}

impl CreditPolicy {
    pub fn from_env() -> Self {
        let refund_on_failure = env::var("CREDITS_REFUND_ON_FAILURE")
            .ok()
            .map_or(true, |val| val != "false");
        let partial_charge = match env::var("CREDITS_PARTIAL_CHARGE").ok().as_deref() {
            Some("requested") => PartialCharge::Requested,
            _ => PartialCharge::PerSuccess,
        };

        CreditPolicy {
            refund_on_failure,
            partial_charge,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bedrock: None,
            flux: FluxConfig::default(),
            luma: LumaConfig::default(),
            postgres: None,
            storage: StorageConfig::default(),
            urls: UrlConfig::default(),
            credits: CreditPolicy::default(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            request_timeout_secs: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let use_bedrock = env::var("USE_BEDROCK").ok().map_or(false, |val| val == "true");
        let use_psql = env::var("USE_PSQL").ok().map_or(false, |val| val == "true");
        let call_timeout_secs = positive_secs(env::var("PROVIDER_CALL_TIMEOUT_SECS").ok())
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);
        let request_timeout_secs = positive_secs(env::var("REQUEST_TIMEOUT_SECS").ok());

        AppConfig {
            bedrock: use_bedrock.then(BedrockConfig::from_env),
            flux: FluxConfig::from_env(),
            luma: LumaConfig::from_env(),
            postgres: use_psql.then(PostgresConfig::from_env),
            storage: StorageConfig::from_env(),
            urls: UrlConfig::from_env(),
            credits: CreditPolicy::from_env(),
            call_timeout_secs,
            request_timeout_secs,
        }
    }

    pub fn with_bedrock(mut self, config: BedrockConfig) -> Self {
        self.bedrock = Some(config);
        self
    }

    pub fn with_flux(mut self, config: FluxConfig) -> Self {
        self.flux = config;
        self
    }

    pub fn with_luma(mut self, config: LumaConfig) -> Self {
        self.luma = config;
        self
    }

    pub fn with_postgres(mut self, config: PostgresConfig) -> Self {
        self.postgres = Some(config);
        self
    }

    pub fn with_storage(mut self, config: StorageConfig) -> Self {
        self.storage = config;
        self
    }

    pub fn with_urls(mut self, config: UrlConfig) -> Self {
        self.urls = config;
        self
    }

    pub fn with_credit_policy(mut self, policy: CreditPolicy) -> Self {
        self.credits = policy;
        self
    }

    pub fn with_call_timeout(mut self, secs: u64) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// A zero timeout would fail every call, so it falls back to the default.
    pub fn call_timeout(&self) -> Duration {
        match self.call_timeout_secs {
            0 => Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn positive_secs(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse().ok()).filter(|secs: &u64| *secs > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new()
            .with_flux(FluxConfig::new().with_api_key("bfl-key"))
            .with_storage(StorageConfig::new().with_local_root("/tmp/out"))
            .with_request_timeout(120);

        assert_eq!(config.flux.api_key.as_deref(), Some("bfl-key"));
        assert_eq!(config.flux.base_url, "https://api.bfl.ml/v1");
        assert_eq!(
            config.storage.backend,
            StorageBackend::Local {
                root: PathBuf::from("/tmp/out")
            }
        );
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_timeouts_are_ignored() {
        assert_eq!(positive_secs(Some("0".into())), None);
        assert_eq!(positive_secs(Some(" 45 ".into())), Some(45));
        assert_eq!(positive_secs(Some("soon".into())), None);
        assert_eq!(positive_secs(None), None);

        let config = AppConfig::new().with_call_timeout(0).with_request_timeout(0);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn default_credit_policy_refunds() {
        let policy = CreditPolicy::default();
        assert!(policy.refund_on_failure);
        assert_eq!(policy.partial_charge, PartialCharge::PerSuccess);
    }
}
