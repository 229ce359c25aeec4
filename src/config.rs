use crate::{
    error::{Result, StudioError},
    models::Provider,
};
use std::{env, time::Duration};

/// How a provider expects the API key to be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` header.
    Bearer,
    /// `?key=<key>` query parameter.
    QueryKey,
}

/// Static per-provider endpoint settings, read-only once the controller is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub auth: AuthScheme,
    pub pre_request_delay: Duration,
    pub success_cooldown_secs: u64,
    pub rate_limit_cooldown_secs: u64,
}

pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;
pub const DAILY_QUOTA_COOLDOWN_SECS: u64 = 3600;

impl ProviderEndpoint {
    pub fn openai() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            auth: AuthScheme::Bearer,
            pre_request_delay: Duration::from_secs(2),
            success_cooldown_secs: 10,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
        }
    }

    pub fn gemini() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            auth: AuthScheme::QueryKey,
            pre_request_delay: Duration::from_secs(3),
            success_cooldown_secs: 5,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
        }
    }

    pub fn zai() -> Self {
        Self {
            base_url: "https://open.bigmodel.cn".to_string(),
            auth: AuthScheme::Bearer,
            pre_request_delay: Duration::from_secs(3),
            success_cooldown_secs: 15,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_pre_request_delay(mut self, delay: Duration) -> Self {
        self.pre_request_delay = delay;
        self
    }

    pub fn with_success_cooldown(mut self, secs: u64) -> Self {
        self.success_cooldown_secs = secs;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, secs: u64) -> Self {
        self.rate_limit_cooldown_secs = secs;
        self
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub openai: ProviderEndpoint,
    pub gemini: ProviderEndpoint,
    pub zai: ProviderEndpoint,
    pub request_timeout: Duration,
    pub tick_interval: Duration,
    /// When false no ticker task is spawned and cooldowns only advance through
    /// `GenerationController::tick`.
    pub auto_tick: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        StudioConfig {
            openai: ProviderEndpoint::openai(),
            gemini: ProviderEndpoint::gemini(),
            zai: ProviderEndpoint::zai(),
            request_timeout: Duration::from_secs(120),
            tick_interval: Duration::from_secs(1),
            auto_tick: true,
        }
    }
}

impl StudioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("IMAGESTUDIO_OPENAI_BASE_URL") {
            config.openai = config.openai.with_base_url(url);
        }
        if let Ok(url) = env::var("IMAGESTUDIO_GEMINI_BASE_URL") {
            config.gemini = config.gemini.with_base_url(url);
        }
        if let Ok(url) = env::var("IMAGESTUDIO_ZAI_BASE_URL") {
            config.zai = config.zai.with_base_url(url);
        }
        if let Ok(raw) = env::var("IMAGESTUDIO_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                StudioError::Config(format!("IMAGESTUDIO_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::GeminiImagen => &self.gemini,
            Provider::ZaiCogView => &self.zai,
        }
    }

    pub fn with_endpoint(mut self, provider: Provider, endpoint: ProviderEndpoint) -> Self {
        match provider {
            Provider::OpenAi => self.openai = endpoint,
            Provider::GeminiImagen => self.gemini = endpoint,
            Provider::ZaiCogView => self.zai = endpoint,
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_auto_tick(mut self, enabled: bool) -> Self {
        self.auto_tick = enabled;
        self
    }

    /// Removes every pre-request delay. Used for scripted runs and tests.
    pub fn without_delays(mut self) -> Self {
        for endpoint in [&mut self.openai, &mut self.gemini, &mut self.zai] {
            endpoint.pre_request_delay = Duration::ZERO;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for provider in Provider::all() {
            let endpoint = self.endpoint(provider);
            if !(endpoint.base_url.starts_with("http://")
                || endpoint.base_url.starts_with("https://"))
            {
                return Err(StudioError::Config(format!(
                    "{} base url must start with http:// or https://: {}",
                    provider, endpoint.base_url
                )));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(StudioError::Config("request timeout must be non-zero".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(StudioError::Config("tick interval must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let config = StudioConfig::new();
        assert_eq!(config.openai.auth, AuthScheme::Bearer);
        assert_eq!(config.gemini.auth, AuthScheme::QueryKey);
        assert_eq!(
            config.zai.url("/api/paas/v4/images/generations"),
            "https://open.bigmodel.cn/api/paas/v4/images/generations"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = StudioConfig::new()
            .with_endpoint(
                Provider::OpenAi,
                ProviderEndpoint::openai().with_base_url("http://localhost:9000/"),
            )
            .with_auto_tick(false)
            .without_delays();

        assert_eq!(config.openai.url("v1/models"), "http://localhost:9000/v1/models");
        assert!(!config.auto_tick);
        assert!(config.zai.pre_request_delay.is_zero());
        assert_eq!(config.zai.success_cooldown_secs, 15);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = StudioConfig::new().with_endpoint(
            Provider::ZaiCogView,
            ProviderEndpoint::zai().with_base_url("open.bigmodel.cn"),
        );
        assert!(matches!(config.validate(), Err(StudioError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = StudioConfig::new().with_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(StudioError::Config(_))));

        let config = StudioConfig::new().with_tick_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(StudioError::Config(_))));
    }

    // env vars are process-wide; every case runs in this one test
    #[test]
    fn test_from_env_overrides() {
        const VARS: [&str; 4] = [
            "IMAGESTUDIO_OPENAI_BASE_URL",
            "IMAGESTUDIO_GEMINI_BASE_URL",
            "IMAGESTUDIO_ZAI_BASE_URL",
            "IMAGESTUDIO_TIMEOUT_SECS",
        ];
        let clear = || VARS.iter().for_each(|var| env::remove_var(var));

        clear();
        let config = StudioConfig::from_env().unwrap();
        assert_eq!(config.openai, ProviderEndpoint::openai());
        assert_eq!(config.request_timeout, Duration::from_secs(120));

        env::set_var("IMAGESTUDIO_OPENAI_BASE_URL", "http://localhost:8080/");
        env::set_var("IMAGESTUDIO_GEMINI_BASE_URL", "http://localhost:8081");
        env::set_var("IMAGESTUDIO_ZAI_BASE_URL", "https://zai.internal//");
        env::set_var("IMAGESTUDIO_TIMEOUT_SECS", " 30 ");
        let config = StudioConfig::from_env().unwrap();
        assert_eq!(config.openai.base_url, "http://localhost:8080");
        assert_eq!(config.gemini.base_url, "http://localhost:8081");
        assert_eq!(config.zai.base_url, "https://zai.internal");
        assert_eq!(config.gemini.auth, AuthScheme::QueryKey);
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        env::set_var("IMAGESTUDIO_TIMEOUT_SECS", "soon");
        assert!(matches!(StudioConfig::from_env(), Err(StudioError::Config(_))));

        env::set_var("IMAGESTUDIO_TIMEOUT_SECS", "0");
        assert!(matches!(StudioConfig::from_env(), Err(StudioError::Config(_))));

        env::set_var("IMAGESTUDIO_TIMEOUT_SECS", "30");
        env::set_var("IMAGESTUDIO_ZAI_BASE_URL", "open.bigmodel.cn");
        assert!(matches!(StudioConfig::from_env(), Err(StudioError::Config(_))));

        clear();
    }
}
