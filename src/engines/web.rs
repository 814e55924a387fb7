//! General web search provider
//!
//! Google web results through serper.dev; the whole count is requested
//! in a single call.

use super::paging::{self, FetchedPage, Page, PageFetcher, SearchPlan};
use super::scholar::{base_result, merge_extras, parse_organic, post_serper, require_api_key};
use super::traits::*;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::search::SearchQuery;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const SOURCE_LABEL: &str = "Google";

/// Web search provider backed by serper.dev
pub struct Web {
    config: ProviderConfig,
    ctx: ProviderContext,
}

impl Web {
    pub fn new(config: ProviderConfig, ctx: ProviderContext) -> Result<Self> {
        require_api_key(&config)?;
        Ok(Self { config, ctx })
    }

    fn body(&self, plan: &SearchPlan, page: Page) -> Value {
        let mut body = json!({
            "q": plan.query,
            "num": page.size,
        });
        for key in ["gl", "hl"] {
            if let Some(value) = self.config.params.get(key) {
                body[key] = value.clone();
            }
        }
        merge_extras(&mut body, &plan.extras);
        body
    }
}

#[async_trait]
impl PageFetcher for Web {
    async fn fetch_page(&self, plan: &SearchPlan, page: Page) -> Result<FetchedPage> {
        let response = post_serper(&self.config, &self.ctx, self.body(plan, page)).await?;
        parse_organic(&response, |item| {
            let mut result = base_result(item, SOURCE_LABEL);
            for key in ["position", "date"] {
                if let Some(value) = item.get(key) {
                    result = result.with_meta(key, value.clone());
                }
            }
            result
        })
    }
}

#[async_trait]
impl SearchProvider for Web {
    fn source_label(&self) -> &str {
        SOURCE_LABEL
    }

    fn capability(&self) -> Capability {
        Capability::SingleShot
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
        paging::run(self, &self.ctx, &self.config, query, self.capability()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::error::RelayError;
    use crate::network::HttpClient;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn web_for(server: &MockServer) -> Web {
        let mut config = ProviderConfig::new(ProviderKind::Web)
            .with_base_url(format!("{}/search", server.uri()))
            .with_api_key("test-key")
            .with_result_cap(20);
        config.params.insert("gl".into(), json!("us"));
        Web::new(config, ProviderContext::new(HttpClient::new().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn test_single_request_for_full_count() {
        let server = MockServer::start().await;
        let items: Vec<Value> = (1..=20)
            .map(|i| {
                json!({
                    "title": format!("Result {}", i),
                    "link": format!("https://example.com/{}", i),
                    "snippet": "text",
                    "position": i,
                })
            })
            .collect();
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"q": "rust", "num": 20, "gl": "us"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": items })))
            .expect(1)
            .mount(&server)
            .await;

        let web = web_for(&server);
        let outcome = web
            .search(&SearchQuery::new("rust").with_max_results(20))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 20);
        assert_eq!(outcome.results[0].source, "Google");
        assert_eq!(outcome.results[0].metadata["position"], 1);
    }

    #[tokio::test]
    async fn test_missing_organic_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"searchParameters": {}})))
            .mount(&server)
            .await;

        let web = web_for(&server);
        let outcome = web.search(&SearchQuery::new("rust")).await.unwrap();
        assert!(outcome.is_complete());
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_requires_api_key() {
        let config = ProviderConfig::new(ProviderKind::Web);
        let ctx = ProviderContext::new(HttpClient::new().unwrap());
        assert!(matches!(Web::new(config, ctx), Err(RelayError::Config(_))));
    }
}
