//! The LLM client: a provider plus the retry policy.
//!
//! One in-flight call per controller; the client itself is thread-safe and
//! shared across sessions. Latency is measured around the full retry loop
//! and the cost estimate comes from the per-model pricing table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axon_domain::config::{LlmConfig, ModelPricing};
use axon_domain::error::Result;
use axon_domain::trace::TraceEvent;

use crate::retry::{retry_transient, RetryConfig};
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    pricing: HashMap<String, ModelPricing>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            retry: RetryConfig::default().with_max_retries(config.max_retries),
            pricing: config.pricing.clone(),
        }
    }

    /// For tests: no pricing table, custom retry config.
    pub fn with_retry(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            pricing: HashMap::new(),
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Send one generation request, retrying transient failures.
    ///
    /// The returned response carries usage annotated with latency (over the
    /// whole retry loop) and the pricing-table cost estimate.
    pub async fn generate(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let (result, attempts) =
            retry_transient(&self.retry, || self.provider.generate(req)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut response = result?;
        response.usage.latency_ms = Some(latency_ms);
        if let Some(pricing) = self.pricing.get(&response.model) {
            response.usage.cost_usd = Some(pricing.estimate_cost(
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
            ));
        }

        TraceEvent::LlmRequest {
            provider: self.provider.provider_id().to_owned(),
            model: response.model.clone(),
            duration_ms: latency_ms,
            attempts,
            prompt_tokens: Some(response.usage.prompt_tokens),
            completion_tokens: Some(response.usage.completion_tokens),
        }
        .emit();

        Ok(response)
    }
}
