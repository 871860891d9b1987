//! Provider registry: entries, usage windows, enable/disable transitions.
//!
//! The registry owns the ordered set of [`ProviderEntry`] values and their
//! live usage counters. All time-dependent behaviour is lazy: rate windows
//! are reset and cooldowns expire at access time, driven by a caller-supplied
//! `now` in epoch milliseconds. There is no background timer.
//!
//! Per-provider state machine:
//!
//! ```text
//! NoCredential ─────────────────────────────▶ (permanent for process lifetime)
//! Available ──(cap reached)──▶ Exhausted ──(window lapses)──▶ Available
//! Available ──(auth failure)─▶ Cooldown ───(deadline passes)─▶ Available
//!                                        └──(reset_all)──────▶ Available
//! ```

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::status::ProviderStatus;

/// Rolling usage window: a provider's request counter is zeroed once this
/// much time has elapsed since its last recorded use.
pub const USAGE_WINDOW_MS: u64 = 60_000;

/// Startup description of one provider, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Unique provider name (registry key).
    pub name: String,
    /// Model identifier passed through to the backend call.
    pub model: String,
    /// Maximum output tokens passed through to the backend call.
    pub max_output_tokens: u32,
    /// Capacity of the rolling per-minute window.
    pub requests_per_minute: u32,
    /// Whether a credential was present at startup. Never changes at runtime;
    /// a provider without one can never become eligible.
    pub has_credential: bool,
}

/// Live state for one configured provider.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    /// Unique provider name.
    pub name: String,
    /// Whether the provider is currently selectable.
    pub enabled: bool,
    /// Credential presence, set once at startup.
    pub has_credential: bool,
    /// Model identifier for the backend call.
    pub model: String,
    /// Maximum output tokens for the backend call.
    pub max_output_tokens: u32,
    /// Window capacity.
    pub requests_per_minute: u32,
    /// Requests recorded in the current window.
    pub request_count: u32,
    /// Epoch ms of the most recent selection; 0 = never used.
    pub last_used_ms: u64,
    /// Cooldown deadline after an auth failure. Checked lazily at each
    /// eligibility pass instead of arming a timer, so repeated failures
    /// simply move the deadline rather than racing overlapping callbacks.
    pub disabled_until_ms: Option<u64>,
}

impl ProviderEntry {
    fn new(spec: ProviderSpec) -> Self {
        Self {
            enabled: spec.has_credential,
            has_credential: spec.has_credential,
            name: spec.name,
            model: spec.model,
            max_output_tokens: spec.max_output_tokens,
            requests_per_minute: spec.requests_per_minute,
            request_count: 0,
            last_used_ms: 0,
            disabled_until_ms: None,
        }
    }

    /// Apply lazy state transitions for the given instant: window reset and
    /// cooldown expiry. Called before every eligibility evaluation.
    fn refresh(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_used_ms) > USAGE_WINDOW_MS && self.request_count > 0 {
            debug!(provider = %self.name, "usage window lapsed, resetting counter");
            self.request_count = 0;
        }

        if !self.enabled && self.has_credential {
            if let Some(deadline) = self.disabled_until_ms {
                if now_ms >= deadline {
                    self.enabled = true;
                    self.disabled_until_ms = None;
                    info!(provider = %self.name, "cooldown elapsed, provider re-enabled");
                }
            }
        }
    }

    /// Eligible = enabled, credentialed, and under the window cap.
    ///
    /// Meaningful only after lazy resets have been applied for the current
    /// instant; the registry does that before every evaluation.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.has_credential && self.request_count < self.requests_per_minute
    }

    fn record_use(&mut self, now_ms: u64) {
        // Clamp at the cap so the [0, requests_per_minute] invariant holds
        // even if record_use is called on an already-exhausted entry.
        self.request_count = self
            .request_count
            .saturating_add(1)
            .min(self.requests_per_minute);
        self.last_used_ms = now_ms;
    }
}

/// The call parameters of a provider selected by [`ProviderRegistry::checkout`].
///
/// A copy of the fields the dispatcher needs — no component holds a live
/// reference into registry state.
#[derive(Debug, Clone)]
pub struct CheckedOut {
    /// Name of the selected provider.
    pub name: String,
    /// Model identifier to invoke with.
    pub model: String,
    /// Maximum output tokens to invoke with.
    pub max_output_tokens: u32,
    /// Request count after the optimistic increment.
    pub request_count: u32,
    /// Window capacity, for logging.
    pub requests_per_minute: u32,
}

/// Shared, internally synchronised registry of provider entries.
///
/// Constructed once at process start; entries are never added or removed
/// thereafter. The select-then-record sequence runs under a single write
/// lock ([`checkout`](Self::checkout)) so concurrent callers cannot jointly
/// overshoot a provider's cap.
#[derive(Debug)]
pub struct ProviderRegistry {
    entries: RwLock<Vec<ProviderEntry>>,
}

impl ProviderRegistry {
    /// Build a registry from startup specs, preserving their order.
    ///
    /// Entries start `enabled = has_credential`.
    pub fn new(specs: Vec<ProviderSpec>) -> Self {
        let entries: Vec<ProviderEntry> = specs.into_iter().map(ProviderEntry::new).collect();
        for e in &entries {
            if !e.has_credential {
                warn!(provider = %e.name, "no credential at startup, provider disabled");
            }
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Apply lazy resets for `now_ms` and return the names of eligible
    /// entries, in registry order.
    pub async fn list_eligible(&self, now_ms: u64) -> Vec<String> {
        let mut entries = self.entries.write().await;
        entries.iter_mut().for_each(|e| e.refresh(now_ms));
        entries
            .iter()
            .filter(|e| e.is_eligible())
            .map(|e| e.name.clone())
            .collect()
    }

    /// Select the least-used eligible provider and record its use, all under
    /// one write lock.
    ///
    /// Returns `None` when no entry is eligible, in which case the registry
    /// is left unchanged apart from lazy resets.
    pub async fn checkout(&self, now_ms: u64) -> Option<CheckedOut> {
        let mut entries = self.entries.write().await;
        entries.iter_mut().for_each(|e| e.refresh(now_ms));

        let idx = crate::selector::least_used(&entries)?;
        let entry = entries.get_mut(idx)?;
        entry.record_use(now_ms);

        Some(CheckedOut {
            name: entry.name.clone(),
            model: entry.model.clone(),
            max_output_tokens: entry.max_output_tokens,
            request_count: entry.request_count,
            requests_per_minute: entry.requests_per_minute,
        })
    }

    /// Increment the named entry's window counter and stamp its last use.
    ///
    /// Unknown names are ignored. [`checkout`](Self::checkout) already
    /// records for the selected provider; this exists for callers driving
    /// selection and accounting separately.
    pub async fn record_use(&self, name: &str, now_ms: u64) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
            entry.record_use(now_ms);
        }
    }

    /// Disable the named entry and arm a lazy re-enable deadline of
    /// `now_ms + cooldown_ms`.
    ///
    /// The deadline only takes effect if the entry still has a credential
    /// when it is next evaluated; uncredentialed entries stay disabled
    /// forever.
    pub async fn disable(&self, name: &str, cooldown_ms: u64, now_ms: u64) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
            entry.enabled = false;
            entry.disabled_until_ms = Some(now_ms.saturating_add(cooldown_ms));
            warn!(
                provider = %entry.name,
                cooldown_ms,
                "provider disabled, will be reconsidered after cooldown"
            );
        }
    }

    /// Re-enable every credentialed entry and zero its usage state.
    ///
    /// Entries without a credential are untouched. Idempotent.
    pub async fn reset_all(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.iter_mut() {
            if entry.has_credential {
                entry.enabled = true;
                entry.request_count = 0;
                entry.last_used_ms = 0;
                entry.disabled_until_ms = None;
            }
        }
        info!("all credentialed providers re-enabled");
    }

    /// Read-only status rows, in registry order.
    ///
    /// Reports stored state as-is; lazy resets are not applied here, so a
    /// snapshot never mutates the registry.
    pub async fn snapshot(&self) -> Vec<ProviderStatus> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|e| ProviderStatus {
                name: e.name.clone(),
                enabled: e.enabled,
                has_credential: e.has_credential,
                request_count: e.request_count,
                requests_per_minute: e.requests_per_minute,
                last_used_ms: e.last_used_ms,
            })
            .collect()
    }
}
