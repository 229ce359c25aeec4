use crate::{
    config::{ProviderEndpoint, StudioConfig},
    error::Result,
    logger,
    models::{
        scrub_secrets, ApiKey, ErrorKind, GenerationRequest, GenerationResult, Provider,
        TestOutcome,
    },
    providers::{default_adapters, AdapterMap, ProviderAdapter},
    throttle::ThrottleState,
    transport::{ReqwestTransport, Transport},
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};

/// Dispatches generation requests to provider adapters and owns the throttle
/// state. At most one generation request is in flight per controller.
pub struct GenerationController {
    adapters: AdapterMap,
    transport: Arc<dyn Transport>,
    throttle: Arc<Mutex<ThrottleState>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
    auto_tick: bool,
}

/// Releases the claimed slot if a submission is dropped before it settles.
struct ClaimGuard<'a> {
    controller: &'a GenerationController,
    armed: bool,
}

impl ClaimGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("⚠️  Generation dropped before completion, releasing slot");
            self.controller.release();
        }
    }
}

impl GenerationController {
    pub fn new(config: StudioConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(&config, Arc::new(transport)))
    }

    pub fn with_transport(config: &StudioConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            adapters: default_adapters(config),
            transport,
            throttle: Arc::new(Mutex::new(ThrottleState::new())),
            ticker: Mutex::new(None),
            tick_interval: config.tick_interval,
            auto_tick: config.auto_tick,
        }
    }

    /// Replaces the adapter for `adapter.provider()`.
    pub fn register_adapter(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn adapter(&self, provider: Provider) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider)
    }

    pub fn throttle(&self) -> ThrottleState {
        *self.state()
    }

    pub async fn submit(&self, request: GenerationRequest) -> GenerationResult {
        let provider = request.provider;
        let Some(adapter) = self.adapters.get(&provider).cloned() else {
            return GenerationResult::error(
                ErrorKind::BadRequest,
                format!("{} is not available", provider.display_name()),
            );
        };

        if request.prompt.trim().is_empty()
            || (adapter.requires_key() && request.api_key.is_empty())
        {
            return GenerationResult::error(
                ErrorKind::BadRequest,
                "Please enter both a prompt and an API key",
            );
        }

        {
            let mut state = self.state();
            if !state.try_claim() {
                let message = if state.cooldown_remaining_secs > 0 {
                    format!(
                        "Please wait {} seconds before generating again",
                        state.cooldown_remaining_secs
                    )
                } else {
                    "A generation request is already in progress".to_string()
                };
                log::debug!("🚦 Rejected {} submission: {}", provider, message);
                return GenerationResult::error(ErrorKind::Throttled, message);
            }
        }
        let guard = ClaimGuard {
            controller: self,
            armed: true,
        };

        let endpoint = adapter.endpoint().clone();
        if !endpoint.pre_request_delay.is_zero() {
            time::sleep(endpoint.pre_request_delay).await;
        }

        log::info!(
            "🎨 Generating image with {} ({})",
            provider.display_name(),
            provider.model()
        );
        let result = {
            let _timer = logger::timer(&format!("{} generation", provider));
            self.dispatch(adapter.as_ref(), &request).await
        };

        guard.disarm();
        self.settle(&result, &endpoint);
        result
    }

    async fn dispatch(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &GenerationRequest,
    ) -> GenerationResult {
        let http = match adapter.build_request(request) {
            Ok(http) => http,
            Err(e) => return GenerationResult::error(ErrorKind::BadRequest, e.to_string()),
        };

        match self.transport.send(http).await {
            Ok(response) => {
                log::debug!("📨 {} answered HTTP {}", request.provider, response.status);
                adapter.parse_response(&response)
            }
            Err(e) => {
                let cause = scrub_secrets(&e.to_string());
                log::error!("❌ {} request failed: {}", request.provider, cause);
                GenerationResult::error(
                    ErrorKind::Network,
                    format!(
                        "Could not reach {}: {}",
                        request.provider.display_name(),
                        cause
                    ),
                )
            }
        }
    }

    fn settle(&self, result: &GenerationResult, endpoint: &ProviderEndpoint) {
        match result {
            GenerationResult::Image(_) => {
                log::info!("✅ Image ready, cooling down {}s", endpoint.success_cooldown_secs);
                self.start_cooldown(endpoint.success_cooldown_secs);
            }
            GenerationResult::Error(e) if e.kind == ErrorKind::RateLimited => {
                let secs = e
                    .retry_after_secs
                    .unwrap_or(endpoint.rate_limit_cooldown_secs);
                log::warn!("⚠️  Rate limited: {} (cooling down {}s)", e.message, secs);
                self.start_cooldown(secs);
            }
            GenerationResult::Error(e) => {
                log::warn!("⚠️  Generation failed: {}", e);
                self.release();
            }
        }
    }

    /// One time unit elapsed. Decrements an active cooldown; no-op otherwise.
    pub fn tick(&self) -> ThrottleState {
        let mut state = self.state();
        state.tick();
        *state
    }

    /// Checks that `api_key` authenticates against `provider`. Never touches
    /// the throttle state.
    pub async fn test_api_key(&self, api_key: &ApiKey, provider: Provider) -> TestOutcome {
        let Some(adapter) = self.adapters.get(&provider) else {
            return TestOutcome::Invalid(format!("{} is not available", provider.display_name()));
        };
        if !adapter.requires_key() {
            return TestOutcome::NotApplicable;
        }
        if api_key.is_empty() {
            return TestOutcome::Invalid("API key is empty".to_string());
        }

        log::info!(
            "🔑 Testing {} key {}",
            provider.display_name(),
            api_key.masked()
        );
        let probe = match adapter.build_key_probe(api_key) {
            Ok(probe) => probe,
            Err(e) => return TestOutcome::Invalid(scrub_secrets(&e.to_string())),
        };
        match self.transport.send(probe).await {
            Ok(response) => adapter.interpret_key_probe(&response),
            Err(e) => TestOutcome::Invalid(format!(
                "Could not reach {}: {}",
                provider.display_name(),
                scrub_secrets(&e.to_string())
            )),
        }
    }

    fn state(&self) -> MutexGuard<'_, ThrottleState> {
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        self.state().release();
        self.cancel_ticker();
    }

    fn start_cooldown(&self, secs: u64) {
        let epoch = self.state().start_cooldown(secs);
        self.cancel_ticker();
        if secs > 0 && self.auto_tick {
            self.spawn_ticker(epoch, secs);
        }
    }

    fn cancel_ticker(&self) {
        let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Ticks at `start + n * interval` so a slow wakeup never accumulates drift.
    fn spawn_ticker(&self, epoch: u64, secs: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("⚠️  No async runtime, cooldown must be ticked manually");
            return;
        };

        let state = Arc::clone(&self.throttle);
        let interval = self.tick_interval;
        let handle = runtime.spawn(async move {
            let start = Instant::now();
            for n in 1..=secs {
                let step = u32::try_from(n).unwrap_or(u32::MAX);
                time::sleep_until(start + interval.saturating_mul(step)).await;

                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.tick_for(epoch) || state.can_request {
                    break;
                }
                if state.cooldown_remaining_secs % 10 == 0 {
                    log::debug!("⏳ Cooldown: {}s remaining", state.cooldown_remaining_secs);
                }
            }
        });

        let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handle);
    }
}

impl Drop for GenerationController {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}
