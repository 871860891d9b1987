//! Demo binary for tokio-provider-dispatch
//!
//! Wires an echo provider next to the stock (credential-gated) providers and
//! dispatches a handful of completions, then logs the registry status.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json` — structured JSON output (production)
//! - `RUST_LOG=info` — log level filter (default: info)
//! - `OPENAI_API_KEY` / `HUGGINGFACE_API_KEY` — enable the real providers

use tokio_provider_dispatch::{
    init_tracing, BackendKind, DispatchConfig, Dispatcher, ProviderConfig,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing (JSON or pretty, based on LOG_FORMAT env)
    let _ = init_tracing();

    info!("Starting tokio-provider-dispatch demo");

    // Stock providers plus a credential-free echo provider so the demo works
    // without any API keys configured.
    let mut config = DispatchConfig::default();
    config.providers.push(ProviderConfig {
        name: "echo".to_string(),
        kind: BackendKind::Echo,
        model: "echo".to_string(),
        max_output_tokens: 256,
        requests_per_minute: 30,
        api_key_env: None,
    });

    let dispatcher = Dispatcher::from_config(&config).await?;

    let demo_prompts = [
        "What is the capital of France?",
        "Explain quantum computing in simple terms",
        "Write a haiku about programming",
        "How does photosynthesis work?",
        "What are the benefits of exercise?",
    ];

    info!(count = demo_prompts.len(), "Sending demo requests");

    for prompt in demo_prompts {
        match dispatcher
            .complete(prompt, Some("You are a concise assistant."))
            .await
        {
            Ok(completion) => info!(
                provider = %completion.provider,
                chars = completion.content.len(),
                "completion served"
            ),
            Err(e) => warn!(error = %e, "completion failed"),
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    let report = dispatcher.status().await;
    info!(total_enabled = report.total_enabled, "final provider status");
    for p in &report.providers {
        info!(
            provider = %p.name,
            enabled = p.enabled,
            used = p.request_count,
            cap = p.requests_per_minute,
            "provider"
        );
    }

    info!("Demo complete");
    Ok(())
}
