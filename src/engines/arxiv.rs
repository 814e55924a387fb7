//! arXiv search provider
//!
//! Uses the arXiv export API (Atom feed) to search scholarly articles in
//! physics, mathematics, computer science, and other fields.

use super::paging::{self, FetchedPage, Page, PageFetcher, SearchPlan};
use super::traits::*;
use crate::config::ProviderConfig;
use crate::error::{RelayError, Result};
use crate::network::ProviderRequest;
use crate::results::SearchResult;
use crate::search::SearchQuery;
use async_trait::async_trait;
use serde_json::Value;

pub const SOURCE_LABEL: &str = "arXiv";

/// Field prefixes understood by the arXiv query syntax
const FIELD_PREFIXES: &[&str] = &["ti", "au", "abs", "co", "jr", "cat", "rn", "id", "all"];

/// arXiv search provider for scientific papers
pub struct ArXiv {
    config: ProviderConfig,
    ctx: ProviderContext,
}

impl ArXiv {
    pub fn new(config: ProviderConfig, ctx: ProviderContext) -> Self {
        Self { config, ctx }
    }

    /// Build the HTTP request for one page
    fn request(&self, plan: &SearchPlan, page: Page) -> ProviderRequest {
        ProviderRequest::get(self.config.endpoint())
            .param("search_query", search_query(&plan.query))
            .param("start", page.offset.to_string())
            .param("max_results", page.size.to_string())
            .param("sortBy", plan.sort.as_str())
            .param("sortOrder", "descending")
    }

    /// Parse the Atom XML response
    fn parse_atom_response(xml: &str) -> Result<FetchedPage> {
        let mut page = FetchedPage::default();

        for entry_str in xml.split("<entry>").skip(1) {
            let entry = match entry_str.find("</entry>") {
                Some(end) => &entry_str[..end],
                None => continue,
            };

            page.hits += 1;

            let url = Self::extract_tag(entry, "id").unwrap_or_default();
            if url.contains("/api/errors") {
                let detail = Self::extract_tag(entry, "summary").unwrap_or_default();
                return Err(RelayError::malformed(format!(
                    "arXiv rejected the query: {}",
                    collapse_whitespace(&detail)
                )));
            }

            let title = Self::extract_tag(entry, "title")
                .map(|t| collapse_whitespace(&t))
                .unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                continue;
            }

            let summary = Self::extract_tag(entry, "summary")
                .map(|s| collapse_whitespace(&s))
                .unwrap_or_default();

            let authors: Vec<Value> = entry
                .split("<author>")
                .skip(1)
                .filter_map(|block| Self::extract_tag(block, "name"))
                .map(|name| Value::String(unescape(name.trim())))
                .collect();

            let categories: Vec<Value> = entry
                .split("<category term=\"")
                .skip(1)
                .filter_map(|cat| cat.find('"').map(|end| Value::String(cat[..end].to_string())))
                .collect();

            let mut result = SearchResult::new(title, url.trim(), summary, SOURCE_LABEL)
                .with_meta("authors", authors)
                .with_meta(
                    "published",
                    Self::extract_tag(entry, "published").unwrap_or_default(),
                )
                .with_meta("categories", categories);

            if let Some(updated) = Self::extract_tag(entry, "updated") {
                result = result.with_meta("updated", updated);
            }
            if let Some(pdf) = Self::pdf_link(entry) {
                result = result.with_meta("pdf_url", pdf);
            }
            if let Some(doi) = Self::extract_tag(entry, "arxiv:doi") {
                result = result.with_meta("doi", doi);
            }
            if let Some(journal) = Self::extract_tag(entry, "arxiv:journal_ref") {
                result = result.with_meta("journal_ref", collapse_whitespace(&journal));
            }

            page.results.push(result);
        }

        Ok(page)
    }

    /// Extract text content from an XML tag
    fn extract_tag(xml: &str, tag: &str) -> Option<String> {
        let start_tag = format!("<{}", tag);
        let end_tag = format!("</{}>", tag);

        let mut search_from = 0;
        let start = loop {
            let pos = xml[search_from..].find(&start_tag)? + search_from;
            // skip longer tag names sharing the prefix, e.g. <id> vs <identifier>
            match xml[pos + start_tag.len()..].chars().next() {
                Some('>') | Some(' ') => break pos,
                _ => search_from = pos + start_tag.len(),
            }
        };
        let content_start = xml[start..].find('>')? + start + 1;
        let end = xml[content_start..].find(&end_tag)? + content_start;

        Some(unescape(&xml[content_start..end]))
    }

    /// href of the `<link title="pdf" .../>` element
    fn pdf_link(entry: &str) -> Option<String> {
        entry
            .split("<link ")
            .skip(1)
            .filter_map(|link| link.find('>').map(|end| &link[..end]))
            .find(|attrs| attrs.contains("title=\"pdf\""))
            .and_then(|attrs| {
                let start = attrs.find("href=\"")? + 6;
                let len = attrs[start..].find('"')?;
                Some(attrs[start..start + len].to_string())
            })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Queries already using field syntax (`ti:`, `au:`, ...) go out as given;
/// anything else searches all fields.
fn search_query(query: &str) -> String {
    let fielded = query
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter_map(|token| token.split_once(':'))
        .any(|(field, _)| FIELD_PREFIXES.contains(&field));
    if fielded {
        query.to_string()
    } else {
        format!("all:{}", query)
    }
}

#[async_trait]
impl PageFetcher for ArXiv {
    async fn fetch_page(&self, plan: &SearchPlan, page: Page) -> Result<FetchedPage> {
        let response = self
            .ctx
            .client
            .execute_with_timeout(
                self.request(plan, page),
                Some(self.config.timeout_or(self.ctx.default_timeout)?),
            )
            .await?
            .error_for_status()?;

        Self::parse_atom_response(&response.text)
    }
}

#[async_trait]
impl SearchProvider for ArXiv {
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
        paging::run(self, &self.ctx, &self.config, query, self.capability()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::network::HttpClient;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Atom feed with `count` entries numbered from `first`
    pub(crate) fn atom_feed(first: usize, count: usize) -> String {
        let entries: String = (first..first + count)
            .map(|i| {
                format!(
                    r#"<entry>
    <id>http://arxiv.org/abs/2301.{i:05}v1</id>
    <updated>2023-01-02T00:00:00Z</updated>
    <published>2023-01-01T00:00:00Z</published>
    <title>Attention
      Paper {i}</title>
    <summary>  Transformers &amp; more, part {i}.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2301.{i:05}v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2301.{i:05}v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/query</id>
{entries}</feed>"#
        )
    }

    pub(crate) fn arxiv_for(server: &MockServer, cap: usize) -> ArXiv {
        let config = ProviderConfig::new(ProviderKind::Arxiv)
            .with_base_url(format!("{}/api/query", server.uri()))
            .with_result_cap(cap)
            .with_page_delay(std::time::Duration::ZERO);
        ArXiv::new(config, ProviderContext::new(HttpClient::new().unwrap()))
    }

    #[test]
    fn test_extract_tag() {
        let xml = "<entry><title>Test Title</title><summary>A &amp; B</summary></entry>";
        assert_eq!(
            ArXiv::extract_tag(xml, "title"),
            Some("Test Title".to_string())
        );
        assert_eq!(
            ArXiv::extract_tag(xml, "summary"),
            Some("A & B".to_string())
        );
        assert_eq!(ArXiv::extract_tag(xml, "missing"), None);
        assert_eq!(
            ArXiv::extract_tag("<identifier>x</identifier><id>y</id>", "id"),
            Some("y".to_string())
        );
    }

    #[test]
    fn test_parse_entry() {
        let page = ArXiv::parse_atom_response(&atom_feed(1, 1)).unwrap();
        assert_eq!(page.hits, 1);

        let results = page.results;
        assert_eq!(results.len(), 1);

        let paper = &results[0];
        assert_eq!(paper.title, "Attention Paper 1");
        assert_eq!(paper.url, "http://arxiv.org/abs/2301.00001v1");
        assert_eq!(paper.snippet, "Transformers & more, part 1.");
        assert_eq!(paper.source, "arXiv");
        assert_eq!(
            paper.metadata["authors"],
            serde_json::json!(["Ada Lovelace", "Alan Turing"])
        );
        assert_eq!(paper.metadata["categories"], serde_json::json!(["cs.LG", "cs.AI"]));
        assert_eq!(paper.metadata["published"], "2023-01-01T00:00:00Z");
        assert_eq!(paper.metadata["pdf_url"], "http://arxiv.org/pdf/2301.00001v1");
    }

    #[test]
    fn test_api_error_entry() {
        let xml = r#"<feed><entry><id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title><summary>incorrect id format</summary></entry></feed>"#;
        let err = ArXiv::parse_atom_response(xml).unwrap_err();
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[tokio::test]
    async fn test_request_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("search_query", "all:machine learning"))
            .and(query_param("start", "0"))
            .and(query_param("max_results", "5"))
            .and(query_param("sortBy", "submittedDate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 5)))
            .expect(1)
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        let query = SearchQuery::new("machine learning")
            .with_max_results(5)
            .with_sort("submittedDate");
        let outcome = arxiv.search(&query).await.unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.results.len(), 5);
    }

    #[test]
    fn test_search_query_prefix() {
        assert_eq!(search_query("transformer"), "all:transformer");
        assert_eq!(search_query("ti:transformer AND au:vaswani"), "ti:transformer AND au:vaswani");
        assert_eq!(search_query("(cat:cs.LG OR cat:cs.AI)"), "(cat:cs.LG OR cat:cs.AI)");
        assert_eq!(search_query("ratio 3:2"), "all:ratio 3:2");
    }

    #[tokio::test]
    async fn test_fielded_query_sent_as_given() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("search_query", "ti:transformer AND au:vaswani"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        let outcome = arxiv
            .search(&SearchQuery::new("ti:transformer AND au:vaswani").with_max_results(2))
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn test_reconfigure_rejects_bad_timeout() {
        let mut arxiv = ArXiv::new(
            ProviderConfig::new(ProviderKind::Arxiv),
            ProviderContext::new(HttpClient::new().unwrap()),
        );
        for timeout in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let mut config = arxiv.config().clone();
            config.timeout = Some(timeout);
            assert!(matches!(
                arxiv.reconfigure(config),
                Err(RelayError::Config(_))
            ));
        }
        assert_eq!(arxiv.config().timeout, None);
    }

    #[tokio::test]
    async fn test_bad_timeout_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 1)))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = ProviderConfig::new(ProviderKind::Arxiv)
            .with_base_url(format!("{}/api/query", server.uri()))
            .with_page_delay(std::time::Duration::ZERO);
        config.timeout = Some(-1.0);
        let arxiv = ArXiv::new(config, ProviderContext::new(HttpClient::new().unwrap()));

        let outcome = arxiv.search(&SearchQuery::new("q")).await.unwrap();
        assert!(outcome.results.is_empty());
        assert!(matches!(
            outcome.error.as_ref().map(|e| e.root()),
            Some(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_excess_count_clamped_to_ten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("max_results", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 10)))
            .expect(1)
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        let outcome = arxiv
            .search(&SearchQuery::new("q").with_max_results(50))
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 10);
    }

    #[tokio::test]
    async fn test_invalid_parameters_make_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 1)))
            .expect(0)
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        for query in [
            SearchQuery::new("q").with_max_results(0),
            SearchQuery::new("q").with_max_results(-1),
            SearchQuery::new("q").with_extra("max_results", "invalid"),
            SearchQuery::new("q").with_sort("newest"),
        ] {
            let result = arxiv.search(&query).await;
            assert!(matches!(result, Err(RelayError::InvalidParameter(_))));
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_returns_empty_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        let outcome = arxiv.search(&SearchQuery::new("q")).await.unwrap();

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.error.unwrap().root().status(), Some(503));
    }

    #[tokio::test]
    async fn test_normalization_is_stable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(0, 3)))
            .mount(&server)
            .await;

        let arxiv = arxiv_for(&server, 10);
        let query = SearchQuery::new("q").with_max_results(3);
        let first = arxiv.search(&query).await.unwrap().into_results();
        let second = arxiv.search(&query).await.unwrap().into_results();
        assert_eq!(first, second);
    }
}
