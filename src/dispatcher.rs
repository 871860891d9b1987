//! Dispatch orchestration: select → invoke → account → classify.
//!
//! The [`Dispatcher`] is the sole entry point for completion requests. It
//! holds a mapping from provider name to [`BackendAdapter`] implementation,
//! so dispatch logic never branches on provider kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::backend::{BackendAdapter, EchoBackend, HuggingFaceBackend, OpenAiBackend};
use crate::config::{BackendKind, DispatchConfig};
use crate::registry::ProviderRegistry;
use crate::status::StatusReport;
use crate::{Completion, DispatchError};

/// Default cooldown applied after an auth-classified failure.
pub const DEFAULT_AUTH_COOLDOWN_MS: u64 = 60_000;

/// Milliseconds since the Unix epoch. Clamps to 0 for clocks before 1970.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Routes completion requests to the best eligible provider.
///
/// One registry, one adapter per provider name. Exactly one provider is
/// attempted per [`complete`](Self::complete) call — no intra-call fallback
/// and no internal retry. Callers wanting a deadline must impose it
/// externally around the whole call.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    adapters: HashMap<String, Arc<dyn BackendAdapter>>,
    cooldown_ms: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("cooldown_ms", &self.cooldown_ms)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher over a registry and its adapters.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if any registry entry has no
    /// registered adapter, so the mismatch surfaces at startup instead of
    /// mid-dispatch.
    pub async fn new(
        registry: Arc<ProviderRegistry>,
        adapters: HashMap<String, Arc<dyn BackendAdapter>>,
    ) -> Result<Self, DispatchError> {
        for status in registry.snapshot().await {
            if !adapters.contains_key(&status.name) {
                return Err(DispatchError::Config(format!(
                    "no adapter registered for provider '{}'",
                    status.name
                )));
            }
        }
        Ok(Self {
            registry,
            adapters,
            cooldown_ms: DEFAULT_AUTH_COOLDOWN_MS,
        })
    }

    /// Build a fully wired dispatcher from configuration.
    ///
    /// Resolves credentials from the environment, constructs one adapter per
    /// provider, and seeds the registry. Providers whose credential variable
    /// is unset start permanently disabled (their adapter still exists but
    /// is never selected).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the configuration fails
    /// validation.
    pub async fn from_config(config: &DispatchConfig) -> Result<Self, DispatchError> {
        config.validate()?;

        let mut adapters: HashMap<String, Arc<dyn BackendAdapter>> = HashMap::new();
        for p in &config.providers {
            let adapter: Arc<dyn BackendAdapter> = match p.kind {
                BackendKind::OpenAi => {
                    Arc::new(OpenAiBackend::new(p.credential().unwrap_or_default()))
                }
                BackendKind::HuggingFace => {
                    Arc::new(HuggingFaceBackend::new(p.credential().unwrap_or_default()))
                }
                BackendKind::Echo => Arc::new(EchoBackend::new()),
            };
            adapters.insert(p.name.clone(), adapter);
        }

        let specs = config.providers.iter().map(|p| p.to_spec()).collect();
        let registry = Arc::new(ProviderRegistry::new(specs));
        Ok(Self::new(registry, adapters)
            .await?
            .with_cooldown_ms(config.cooldown_ms))
    }

    /// Override the auth-failure cooldown.
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// Shared handle to the underlying registry.
    pub fn registry(&self) -> Arc<ProviderRegistry> {
        Arc::clone(&self.registry)
    }

    /// Dispatch one completion request.
    ///
    /// Selects the least-used eligible provider, records its use, then
    /// invokes its adapter. Usage is recorded *before* the backend call
    /// returns, so concurrent callers observe the updated load while the
    /// call is in flight. Known limitation: if the process dies mid-call the
    /// slot is still consumed — counters are process-local and never
    /// persisted, so the overcount is bounded by one window.
    ///
    /// On failure the registry is updated first (auth → cooldown disable,
    /// transient → untouched), then the original backend error is
    /// propagated. A failed call means "this attempt failed"; re-invoking
    /// may land on a different provider.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoProviderAvailable`] when nothing is eligible (no
    /// mutation performed), or [`DispatchError::Provider`] carrying the
    /// backend's [`ProviderError`](crate::ProviderError).
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, DispatchError> {
        let picked = self
            .registry
            .checkout(epoch_ms())
            .await
            .ok_or(DispatchError::NoProviderAvailable)?;

        info!(
            provider = %picked.name,
            model = %picked.model,
            used = picked.request_count,
            cap = picked.requests_per_minute,
            "dispatching completion"
        );

        let adapter = self.adapters.get(&picked.name).ok_or_else(|| {
            DispatchError::Config(format!(
                "no adapter registered for provider '{}'",
                picked.name
            ))
        })?;

        match adapter
            .invoke(prompt, system_prompt, &picked.model, picked.max_output_tokens)
            .await
        {
            Ok(content) => Ok(Completion {
                content,
                provider: picked.name,
            }),
            Err(err) => {
                if err.is_auth() {
                    warn!(
                        provider = %picked.name,
                        error = %err,
                        "auth-classified failure, disabling provider for cooldown"
                    );
                    self.registry
                        .disable(&picked.name, self.cooldown_ms, epoch_ms())
                        .await;
                } else {
                    warn!(
                        provider = %picked.name,
                        error = %err,
                        "transient failure, provider stays enabled"
                    );
                }
                Err(DispatchError::Provider {
                    provider: picked.name,
                    source: err,
                })
            }
        }
    }

    /// Current status of every provider.
    pub async fn status(&self) -> StatusReport {
        StatusReport::new(self.registry.snapshot().await)
    }

    /// Re-enable all credentialed providers and zero their usage state.
    pub async fn reset_providers(&self) {
        self.registry.reset_all().await;
    }
}
