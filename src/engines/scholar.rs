//! Google Scholar search provider
//!
//! Queries Google Scholar through the serper.dev JSON API. Results come
//! back ten to a page under `organic`.

use super::paging::{self, FetchedPage, Page, PageFetcher, SearchPlan};
use super::traits::*;
use crate::config::ProviderConfig;
use crate::error::{RelayError, Result};
use crate::network::{ProviderRequest, ProviderResponse};
use crate::results::SearchResult;
use crate::search::{SearchQuery, SortCriterion};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

pub const SOURCE_LABEL: &str = "Google Scholar";

/// Google Scholar provider backed by serper.dev
pub struct Scholar {
    config: ProviderConfig,
    ctx: ProviderContext,
}

impl Scholar {
    /// Fails with a configuration error when no API key is set
    pub fn new(config: ProviderConfig, ctx: ProviderContext) -> Result<Self> {
        require_api_key(&config)?;
        Ok(Self { config, ctx })
    }

    fn body(&self, plan: &SearchPlan, page: Page) -> Value {
        let mut body = json!({
            "q": plan.query,
            "hl": self.config.param_str("hl", "en"),
            "as_sdt": self.config.param_str("as_sdt", "0,5"),
            "as_vis": self.config.param_str("as_vis", "1"),
            "page": page.number,
        });
        merge_extras(&mut body, &plan.extras);
        body
    }

    fn parse_response(response: &ProviderResponse) -> Result<FetchedPage> {
        parse_organic(response, |item| {
            let mut result = base_result(item, SOURCE_LABEL)
                .with_meta("year", item.get("year").cloned().unwrap_or(Value::Null))
                .with_meta(
                    "citedBy",
                    item.get("citedBy").cloned().unwrap_or(Value::Null),
                );
            for key in ["pdfUrl", "id", "publicationInfo"] {
                if let Some(value) = item.get(key).filter(|v| !v.is_null()) {
                    result = result.with_meta(key, value.clone());
                }
            }
            result
        })
    }
}

/// Scholar and web searches share the serper.dev account
pub(crate) fn require_api_key(config: &ProviderConfig) -> Result<&str> {
    config
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| RelayError::Config(format!("{} requires an API key", config.name)))
}

/// POST `body` to the provider endpoint with the serper.dev key header
pub(crate) async fn post_serper(
    config: &ProviderConfig,
    ctx: &ProviderContext,
    body: Value,
) -> Result<ProviderResponse> {
    let request = ProviderRequest::post(config.endpoint())
        .header("X-API-KEY", require_api_key(config)?)
        .json(body);

    ctx.client
        .execute_with_timeout(request, Some(config.timeout_or(ctx.default_timeout)?))
        .await?
        .error_for_status()
}

/// Copy forwarded query extras into a JSON request body
pub(crate) fn merge_extras(body: &mut Value, extras: &Map<String, Value>) {
    if let Some(object) = body.as_object_mut() {
        for (key, value) in extras {
            object.insert(key.clone(), value.clone());
        }
    }
}

/// Normalize every linked entry of the `organic` array with `build`.
///
/// Link-less hits (plain `[CITATION]` entries) are skipped but counted.
pub(crate) fn parse_organic<F>(response: &ProviderResponse, build: F) -> Result<FetchedPage>
where
    F: Fn(&Value) -> SearchResult,
{
    let data: Value = response.json()?;
    let organic = match data.get("organic") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RelayError::malformed("`organic` is not an array")),
        None => return Ok(FetchedPage::default()),
    };

    Ok(FetchedPage {
        hits: organic.len(),
        results: organic
            .iter()
            .filter(|item| item.get("link").and_then(Value::as_str).is_some())
            .map(build)
            .collect(),
    })
}

pub(crate) fn base_result(item: &Value, source: &str) -> SearchResult {
    let text = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or_default();
    SearchResult::new(text("title"), text("link"), text("snippet"), source)
}

#[async_trait]
impl PageFetcher for Scholar {
    async fn fetch_page(&self, plan: &SearchPlan, page: Page) -> Result<FetchedPage> {
        let response = post_serper(&self.config, &self.ctx, self.body(plan, page)).await?;
        Self::parse_response(&response)
    }
}

#[async_trait]
impl SearchProvider for Scholar {
    fn source_label(&self) -> &str {
        SOURCE_LABEL
    }

    fn capability(&self) -> Capability {
        Capability::Paged
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn reconfigure(&mut self, config: ProviderConfig) -> Result<()> {
        check_reconfigure(&self.config, &config)?;
        self.config = config;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        let sort = query.sort_criterion(self.config.sort_by.as_deref())?;
        if sort != SortCriterion::Relevance {
            debug!(provider = %self.config.name, %sort, "sort order not supported, using relevance");
        }
        paging::run(self, &self.ctx, &self.config, query, self.capability()).await
    }
}
