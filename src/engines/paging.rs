//! Count clamping and sequential page collection shared by all providers

use super::traits::{Capability, ProviderContext, SearchOutcome};
use crate::config::ProviderConfig;
use crate::dispatch::RetryPolicy;
use crate::error::Result;
use crate::results::SearchResult;
use crate::search::{SearchQuery, SortCriterion};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Validated, clamped parameters for one provider search
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub query: String,
    /// Results to return, already clamped to the provider cap
    pub count: usize,
    pub page_size: usize,
    pub sort: SortCriterion,
    /// Extras to forward into the provider request
    pub extras: Map<String, Value>,
}

/// One page request within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    /// Index of the first item on this page
    pub offset: usize,
    /// Items wanted from this page
    pub size: usize,
}

impl SearchPlan {
    /// Validate `query` against `config` without touching the network
    pub fn build(config: &ProviderConfig, query: &SearchQuery) -> Result<Self> {
        let requested = query.requested_count(config.max_results)?;
        let sort = query.sort_criterion(config.sort_by.as_deref())?;

        let count = if requested > config.result_cap {
            warn!(
                provider = %config.name,
                requested,
                cap = config.result_cap,
                "max_results exceeds provider limit, clamping"
            );
            config.result_cap
        } else {
            requested
        };

        Ok(Self {
            query: query.text.clone(),
            count,
            page_size: config.page_size.max(1),
            sort,
            extras: query
                .forwarded_extras()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Page `number` given `collected` results so far
    fn page(&self, number: usize, collected: usize, capability: Capability) -> Page {
        let remaining = self.count.saturating_sub(collected);
        let size = match capability {
            Capability::Paged => self.page_size.min(remaining),
            Capability::SingleShot => remaining,
        };
        Page {
            number,
            offset: (number - 1) * self.page_size,
            size,
        }
    }
}

/// One fetched page: the normalized results plus the raw hit count.
///
/// Hits that cannot be normalized (no link, no title) are dropped from
/// `results` but still count toward `hits`, which decides whether the page
/// was short.
#[derive(Debug, Default)]
pub struct FetchedPage {
    pub hits: usize,
    pub results: Vec<SearchResult>,
}

impl From<Vec<SearchResult>> for FetchedPage {
    fn from(results: Vec<SearchResult>) -> Self {
        Self {
            hits: results.len(),
            results,
        }
    }
}

/// Fetches and normalizes a single page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, plan: &SearchPlan, page: Page) -> Result<FetchedPage>;
}

/// Validate, then collect pages until the count is met, a page comes back
/// empty or short, or a page fails. Progress made before a failure is kept.
pub async fn run(
    fetcher: &dyn PageFetcher,
    ctx: &ProviderContext,
    config: &ProviderConfig,
    query: &SearchQuery,
    capability: Capability,
) -> Result<SearchOutcome> {
    let plan = SearchPlan::build(config, query)?;
    if query.is_empty() {
        debug!(provider = %config.name, "empty query, skipping");
        return Ok(SearchOutcome::default());
    }

    info!(
        provider = %config.name,
        query = %plan.query,
        count = plan.count,
        sort = %plan.sort,
        "starting search"
    );

    let retry = RetryPolicy::new(config.max_tries, ctx.base_delay);
    let start = Instant::now();
    let mut results: Vec<SearchResult> = Vec::with_capacity(plan.count);
    let mut number = 1;

    while results.len() < plan.count {
        if number > 1 && !config.page_delay().is_zero() {
            tokio::time::sleep(config.page_delay()).await;
        }

        let page = plan.page(number, results.len(), capability);
        debug!(provider = %config.name, page = page.number, size = page.size, "requesting page");

        let permit = match ctx.gate {
            Some(ref gate) => Some(gate.acquire(&config.name).await),
            None => None,
        };
        let fetched = match permit.transpose() {
            Ok(_permit) => {
                let plan = &plan;
                retry
                    .run(&config.name, |_| async move { fetcher.fetch_page(plan, page).await })
                    .await
            }
            Err(err) => Err(err),
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                ctx.observer
                    .on_failure(&config.name, &err, results.len(), start.elapsed());
                return Ok(SearchOutcome::partial(results, err));
            }
        };

        let hits = fetched.hits;
        let room = plan.count - results.len();
        results.extend(fetched.results.into_iter().take(room));

        if hits == 0 {
            debug!(provider = %config.name, page = page.number, "empty page, no more results");
            break;
        }
        if capability == Capability::SingleShot || hits < page.size {
            break;
        }
        number += 1;
    }

    info!(
        provider = %config.name,
        found_results = results.len(),
        requested_pages = number,
        "search finished"
    );
    ctx.observer
        .on_success(&config.name, results.len(), start.elapsed());
    Ok(SearchOutcome::complete(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::error::RelayError;
    use crate::network::HttpClient;
    use std::sync::Mutex;

    /// Serves canned page sizes, recording every page it is asked for
    struct CannedPages {
        sizes: Vec<usize>,
        fail_on: Option<usize>,
        /// Hits per page that cannot be normalized
        unusable: usize,
        seen: Mutex<Vec<Page>>,
    }

    impl CannedPages {
        fn new(sizes: Vec<usize>) -> Self {
            Self {
                sizes,
                fail_on: None,
                unusable: 0,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn pages(&self) -> Vec<Page> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for CannedPages {
        async fn fetch_page(&self, _plan: &SearchPlan, page: Page) -> Result<FetchedPage> {
            self.seen.lock().unwrap().push(page);
            if self.fail_on == Some(page.number) {
                return Err(RelayError::provider(500, "boom"));
            }
            let n = self.sizes.get(page.number - 1).copied().unwrap_or(0);
            let kept = n.saturating_sub(self.unusable);
            Ok(FetchedPage {
                hits: n,
                results: (0..kept)
                    .map(|i| {
                        let id = page.offset + i;
                        SearchResult::new(format!("t{}", id), format!("u{}", id), "", "test")
                    })
                    .collect(),
            })
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            page_delay_ms: 0,
            result_cap: 100,
            ..ProviderConfig::new(ProviderKind::Scholar)
        }
    }

    fn ctx() -> ProviderContext {
        ProviderContext::new(HttpClient::new().unwrap())
    }

    #[tokio::test]
    async fn test_two_full_pages() {
        let fetcher = CannedPages::new(vec![10, 10, 10]);
        let query = SearchQuery::new("q").with_max_results(15);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::Paged)
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.results.len(), 15);
        let pages = fetcher.pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1], Page { number: 2, offset: 10, size: 5 });
    }

    #[tokio::test]
    async fn test_short_page_stops() {
        let fetcher = CannedPages::new(vec![7, 10]);
        let query = SearchQuery::new("q").with_max_results(15);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::Paged)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 7);
        assert_eq!(fetcher.pages().len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_hits_do_not_end_paging() {
        let mut fetcher = CannedPages::new(vec![10, 10]);
        fetcher.unusable = 1;
        let query = SearchQuery::new("q").with_max_results(15);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::Paged)
            .await
            .unwrap();

        assert_eq!(fetcher.pages().len(), 2);
        assert_eq!(outcome.results.len(), 15);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let fetcher = CannedPages::new(vec![10, 0]);
        let query = SearchQuery::new("q").with_max_results(30);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::Paged)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 10);
        assert_eq!(fetcher.pages().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_progress() {
        let mut fetcher = CannedPages::new(vec![10, 10, 10]);
        fetcher.fail_on = Some(2);
        let query = SearchQuery::new("q").with_max_results(30);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::Paged)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 10);
        assert_eq!(outcome.error.unwrap().status(), Some(500));
    }

    #[tokio::test]
    async fn test_clamped_to_cap() {
        let fetcher = CannedPages::new(vec![10, 10, 10]);
        let query = SearchQuery::new("q").with_max_results(25);
        let capped = config().with_result_cap(10);
        let outcome = run(&fetcher, &ctx(), &capped, &query, Capability::Paged)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 10);
        assert_eq!(fetcher.pages().len(), 1);
    }

    #[tokio::test]
    async fn test_single_shot_one_request() {
        let fetcher = CannedPages::new(vec![20]);
        let query = SearchQuery::new("q").with_max_results(20);
        let outcome = run(&fetcher, &ctx(), &config(), &query, Capability::SingleShot)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 20);
        assert_eq!(fetcher.pages(), vec![Page { number: 1, offset: 0, size: 20 }]);
    }

    #[tokio::test]
    async fn test_invalid_count_before_any_page() {
        let fetcher = CannedPages::new(vec![10]);
        let query = SearchQuery::new("q").with_max_results(0);
        let result = run(&fetcher, &ctx(), &config(), &query, Capability::Paged).await;

        assert!(matches!(result, Err(RelayError::InvalidParameter(_))));
        assert!(fetcher.pages().is_empty());
    }
}
