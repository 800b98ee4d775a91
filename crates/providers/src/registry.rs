//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup
//! the registry reads the [`LlmConfig`], resolves API keys from the
//! environment, and instantiates the appropriate adapter for each entry.

use std::collections::HashMap;
use std::sync::Arc;

use axon_domain::config::{LlmConfig, ProviderKind};
use axon_domain::error::{Error, Result};

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// Holds all instantiated LLM providers, keyed by config id.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize (usually a missing API key) are
    /// logged and skipped rather than aborting startup; callers that need
    /// one fail on lookup instead.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::Anthropic => {
                    AnthropicProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        Ok(Self {
            providers,
            default_id: config.default_provider.clone(),
        })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a provider: the explicit selection, then the configured
    /// default, then any registered provider.
    pub fn resolve(&self, selected: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        if let Some(id) = selected {
            return self
                .get(id)
                .ok_or_else(|| Error::Config(format!("unknown LLM provider '{id}'")));
        }
        if let Some(id) = &self.default_id {
            if let Some(p) = self.get(id) {
                return Ok(p);
            }
        }
        self.providers
            .values()
            .next()
            .cloned()
            .ok_or_else(|| Error::Config("no LLM providers configured".into()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
