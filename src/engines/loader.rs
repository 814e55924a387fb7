//! Provider loader for initializing providers from configuration

use super::traits::{ProviderContext, SearchProvider};
use super::{arxiv, scholar, web};
use crate::config::{ProviderConfig, ProviderKind, Settings};
use crate::error::{RelayError, Result};
use crate::search::SearchAggregator;
use std::sync::Arc;
use tracing::{info, warn};

/// Loader for initializing providers from configuration
pub struct ProviderLoader;

impl ProviderLoader {
    /// Build an aggregator holding every enabled provider in `settings`.
    ///
    /// Providers that fail to initialize are logged and skipped.
    pub fn load(settings: &Settings, ctx: &ProviderContext) -> SearchAggregator {
        let mut aggregator = SearchAggregator::new().with_dedup(settings.search.dedup);

        for config in &settings.providers {
            if config.disabled {
                info!("Skipping disabled provider: {}", config.name);
                continue;
            }

            match Self::create_provider(config.clone(), ctx.clone()) {
                Ok(provider) => {
                    info!("Loaded provider: {} ({})", config.name, config.kind.as_str());
                    aggregator.add_provider(provider);
                }
                Err(e) => {
                    warn!("Failed to load provider {}: {}", config.name, e);
                }
            }
        }

        info!("Loaded {} providers", aggregator.len());
        aggregator
    }

    /// Create a provider instance for `config.kind`
    pub fn create_provider(
        config: ProviderConfig,
        ctx: ProviderContext,
    ) -> Result<Arc<dyn SearchProvider>> {
        config
            .validate()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        let provider: Arc<dyn SearchProvider> = match config.kind {
            ProviderKind::Arxiv => Arc::new(arxiv::ArXiv::new(config, ctx)),
            ProviderKind::Scholar => Arc::new(scholar::Scholar::new(config, ctx)?),
            ProviderKind::Web => Arc::new(web::Web::new(config, ctx)?),
        };
        Ok(provider)
    }

    /// Get list of available provider kinds
    pub fn available_kinds() -> Vec<&'static str> {
        [ProviderKind::Arxiv, ProviderKind::Scholar, ProviderKind::Web]
            .iter()
            .map(ProviderKind::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::HttpClient;

    fn ctx() -> ProviderContext {
        ProviderContext::new(HttpClient::new().unwrap())
    }

    #[test]
    fn test_load_skips_disabled_and_invalid() {
        let yaml = r#"
providers:
  - name: arxiv
    kind: arxiv
  - name: scholar
    kind: scholar
    api_key: secret
  - name: web
    kind: web
    disabled: true
  - name: keyless
    kind: scholar
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let aggregator = ProviderLoader::load(&settings, &ctx());

        assert_eq!(aggregator.names(), vec!["arxiv", "scholar"]);
    }

    #[test]
    fn test_create_provider_labels() {
        let arxiv = ProviderLoader::create_provider(ProviderConfig::new(ProviderKind::Arxiv), ctx())
            .unwrap();
        assert_eq!(arxiv.source_label(), "arXiv");

        let web = ProviderLoader::create_provider(
            ProviderConfig::new(ProviderKind::Web).with_api_key("k"),
            ctx(),
        )
        .unwrap();
        assert_eq!(web.name(), "web");
        assert_eq!(web.source_label(), "Google");
    }

    #[test]
    fn test_available_kinds() {
        assert_eq!(
            ProviderLoader::available_kinds(),
            vec!["arxiv", "scholar", "web"]
        );
    }
}
