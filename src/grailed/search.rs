use crate::config::AlgoliaSettings;
use crate::grailed::config::{FACETS, HITS_PER_PAGE, PRICE_FILTERS};
use crate::models::Listing;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("invalid search response: {0}")]
    Deserialize(String),
}

/// Decoded listings of one page plus the number of raw hits the backend returned.
///
/// `hits` can exceed `listings.len()` when malformed hits were skipped; paging
/// goes by `hits`.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    pub hits: usize,
}

impl From<Vec<Listing>> for ListingPage {
    fn from(listings: Vec<Listing>) -> Self {
        Self {
            hits: listings.len(),
            listings,
        }
    }
}

/// One page of search results at a time. Implementations do not retry.
pub trait ListingSource {
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, SearchError>;
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: Client,
    url: String,
    site_root: String,
    api_key: String,
    app_id: String,
    designer: String,
}

impl SearchClient {
    pub fn new(
        http: Client,
        url: impl Into<String>,
        site_root: impl Into<String>,
        algolia: &AlgoliaSettings,
        designer: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            site_root: site_root.into(),
            api_key: algolia.api_key.clone(),
            app_id: algolia.app_id.clone(),
            designer: designer.into(),
        }
    }

    fn query(&self, page: u32) -> SearchQuery {
        SearchQuery {
            query: "",
            page,
            hits_per_page: HITS_PER_PAGE,
            facet_filters: vec![vec![format!("designers.name:{}", self.designer)]],
            numeric_filters: PRICE_FILTERS,
            facets: FACETS,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    query: &'static str,
    page: u32,
    hits_per_page: usize,
    facet_filters: Vec<Vec<String>>,
    numeric_filters: [&'static str; 2],
    facets: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    hits: Vec<Value>,
}

/// Decodes hits one by one so a single bad record does not sink the page.
fn decode_hits(page: u32, hits: Vec<Value>) -> ListingPage {
    let total = hits.len();
    let listings = hits
        .into_iter()
        .filter_map(|hit| match serde_json::from_value::<Listing>(hit) {
            Ok(listing) => Some(listing),
            Err(err) => {
                warn!(target = "lowball.search", page, error = %err, "skipping malformed hit");
                None
            }
        })
        .collect();
    ListingPage {
        listings,
        hits: total,
    }
}

impl ListingSource for SearchClient {
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, SearchError> {
        let response = self
            .http
            .post(&self.url)
            .header("Accept", "*/*")
            .header("Accept-Language", "en-GB,en;q=0.9")
            .header("Origin", &self.site_root)
            .header("Referer", format!("{}/", self.site_root))
            .header("x-algolia-api-key", &self.api_key)
            .header("x-algolia-application-id", &self.app_id)
            .json(&self.query(page))
            .send()
            .await
            .map_err(|err| SearchError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: SearchPage = response
            .json()
            .await
            .map_err(|err| SearchError::Deserialize(err.to_string()))?;
        debug!(
            target = "lowball.search",
            page,
            hits = payload.hits.len(),
            "search page received"
        );
        Ok(decode_hits(page, payload.hits))
    }
}

/// Pages through the whole result set, waiting `page_delay` between full pages.
///
/// Stops on a short page, an empty page, or a failed request; a failure is logged
/// and whatever was gathered so far is returned.
pub async fn fetch_all<S: ListingSource>(source: &S, page_delay: Duration) -> Vec<Listing> {
    let mut listings = Vec::new();
    let mut page = 0u32;
    loop {
        info!(target = "lowball.search", "fetching page {}...", page + 1);
        let batch = match source.fetch_page(page).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(target = "lowball.search", page, error = %err, "error fetching listings");
                break;
            }
        };
        let full_page = batch.hits >= HITS_PER_PAGE;
        listings.extend(batch.listings);
        if !full_page {
            break;
        }
        page += 1;
        if !page_delay.is_zero() {
            sleep(page_delay).await;
        }
    }
    listings
}
