//! Read-only projections of registry state, plus the manual reset surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::ProviderRegistry;

/// One status row per configured provider, in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Provider name.
    pub name: String,
    /// Whether the provider is currently selectable.
    pub enabled: bool,
    /// Whether a credential was present at startup.
    pub has_credential: bool,
    /// Requests recorded in the current window.
    pub request_count: u32,
    /// Window capacity.
    pub requests_per_minute: u32,
    /// Epoch ms of the most recent selection; 0 = never used.
    pub last_used_ms: u64,
}

/// Aggregate status report: all rows plus a count of usable providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Per-provider rows in registry order.
    pub providers: Vec<ProviderStatus>,
    /// Number of providers that are both enabled and credentialed.
    pub total_enabled: usize,
}

impl StatusReport {
    /// Build a report from status rows.
    pub fn new(providers: Vec<ProviderStatus>) -> Self {
        let total_enabled = providers
            .iter()
            .filter(|p| p.enabled && p.has_credential)
            .count();
        Self {
            providers,
            total_enabled,
        }
    }
}

/// Handle for administrative callers: status snapshots and manual reset.
///
/// Holds only a shared registry reference; cloning is cheap.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: Arc<ProviderRegistry>,
}

impl StatusReporter {
    /// Create a reporter over the given registry.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Current status of every provider, in registry order.
    pub async fn snapshot(&self) -> StatusReport {
        StatusReport::new(self.registry.snapshot().await)
    }

    /// Re-enable all credentialed providers and zero their usage state.
    ///
    /// Idempotent; touches nothing else.
    pub async fn reset_all(&self) {
        self.registry.reset_all().await;
    }
}
