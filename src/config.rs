//! # Startup configuration
//!
//! ## Responsibility
//! Parse and validate the dispatcher's TOML configuration: which providers
//! exist, their models, window caps, and which environment variable holds
//! each credential. Credentials are resolved from the environment once, at
//! startup; registry entries are read-only for the process lifetime.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `DispatchConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Type-safe: invalid field combinations are caught at parse time via serde
//!
//! ## NOT Responsible For
//! - Building the dispatcher from config (that belongs to `dispatcher`)
//! - Performing backend calls (that belongs to `backend`)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::ProviderSpec;
use crate::DispatchError;

// ── Default value functions ──────────────────────────────────────────────

/// Default auth-failure cooldown: 60 000 ms.
fn default_cooldown_ms() -> u64 {
    60_000
}

/// Default maximum output tokens.
fn default_max_output_tokens() -> u32 {
    1024
}

/// Default per-minute window capacity.
fn default_requests_per_minute() -> u32 {
    60
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a dispatcher instance.
///
/// # Example
///
/// ```toml
/// cooldown_ms = 60000
///
/// [[providers]]
/// name = "openai"
/// kind = "open_ai"
/// model = "gpt-4o-mini"
/// max_output_tokens = 4000
/// requests_per_minute = 60
/// api_key_env = "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DispatchConfig {
    /// How long (ms) an auth-failed provider stays disabled.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Configured providers, in selection-order for full ties.
    pub providers: Vec<ProviderConfig>,
}

/// Configuration for one provider backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Unique provider name (registry key).
    pub name: String,
    /// Which backend adapter serves this provider.
    pub kind: BackendKind,
    /// Model identifier passed through to the backend.
    pub model: String,
    /// Maximum output tokens per completion.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Rolling per-minute window capacity.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Environment variable holding the credential. Required for keyed
    /// backend kinds; a set-but-empty or missing variable leaves the
    /// provider permanently disabled rather than failing startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Which backend adapter implementation a provider uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI chat completions API.
    OpenAi,
    /// Hugging Face inference API.
    HuggingFace,
    /// Local echo adapter (testing/demos), no credential needed.
    Echo,
}

impl BackendKind {
    /// Whether this kind needs an API credential to be usable.
    pub fn requires_credential(self) -> bool {
        !matches!(self, Self::Echo)
    }
}

impl ProviderConfig {
    /// Resolve this provider's credential from the environment.
    ///
    /// Returns `None` for unset or empty variables, and for kinds that take
    /// no credential.
    pub fn credential(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Build the registry spec for this provider, resolving credential
    /// presence from the environment.
    ///
    /// Credential-free kinds always count as credentialed.
    pub fn to_spec(&self) -> ProviderSpec {
        let has_credential =
            !self.kind.requires_credential() || self.credential().is_some();
        ProviderSpec {
            name: self.name.clone(),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            requests_per_minute: self.requests_per_minute,
            has_credential,
        }
    }
}

impl Default for DispatchConfig {
    /// The stock two-provider setup: OpenAI as the workhorse, Hugging Face
    /// as the high-cap secondary.
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            providers: vec![
                ProviderConfig {
                    name: "openai".to_string(),
                    kind: BackendKind::OpenAi,
                    model: "gpt-4o-mini".to_string(),
                    max_output_tokens: 4000,
                    requests_per_minute: 60,
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                },
                ProviderConfig {
                    name: "huggingface".to_string(),
                    kind: BackendKind::HuggingFace,
                    model: "HuggingFaceH4/zephyr-7b-beta".to_string(),
                    max_output_tokens: 1000,
                    requests_per_minute: 100,
                    api_key_env: Some("HUGGINGFACE_API_KEY".to_string()),
                },
            ],
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] on parse failure or validation
    /// violations.
    pub fn from_toml_str(input: &str) -> Result<Self, DispatchError> {
        let config: Self = toml::from_str(input)
            .map_err(|e| DispatchError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the file cannot be read, parsed,
    /// or validated.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check all semantic constraints, reporting every violation at once.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] listing each violation on its own
    /// line.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let mut violations = Vec::new();

        if self.providers.is_empty() {
            violations.push("at least one provider must be configured".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if p.name.is_empty() {
                violations.push("provider name must not be empty".to_string());
            } else if !seen.insert(p.name.as_str()) {
                violations.push(format!("duplicate provider name '{}'", p.name));
            }
            if p.model.is_empty() {
                violations.push(format!("provider '{}': model must not be empty", p.name));
            }
            if p.requests_per_minute == 0 {
                violations.push(format!(
                    "provider '{}': requests_per_minute must be >= 1",
                    p.name
                ));
            }
            if p.max_output_tokens == 0 {
                violations.push(format!(
                    "provider '{}': max_output_tokens must be >= 1",
                    p.name
                ));
            }
            if p.kind.requires_credential() && p.api_key_env.is_none() {
                violations.push(format!(
                    "provider '{}': api_key_env is required for this backend kind",
                    p.name
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Config(violations.join("\n")))
        }
    }
}
