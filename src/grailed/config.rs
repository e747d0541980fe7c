use once_cell::sync::Lazy;
use std::env;

pub static SITE_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("GRAILED_SITE_URL")
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://www.grailed.com".to_string())
});

pub static SEARCH_URL: Lazy<String> = Lazy::new(|| {
    env::var("ALGOLIA_QUERY_URL").unwrap_or_else(|_| {
        "https://mnrwefss2q-dsn.algolia.net/1/indexes/Listing_by_heat_production/query"
            .to_string()
    })
});

pub const HITS_PER_PAGE: usize = 40;

pub const PRICE_FILTERS: [&str; 2] = ["price_i>=0", "price_i<=1000000"];

pub const FACETS: &[&str] = &[
    "badges",
    "category_path",
    "category_size",
    "condition",
    "department",
    "designers.name",
    "location",
    "price_i",
    "strata",
];

pub fn conversations_url(site_root: &str) -> String {
    format!("{site_root}/api/conversations")
}

pub fn listing_url(site_root: &str, listing_id: &str) -> String {
    format!("{site_root}/listings/{}", urlencoding::encode(listing_id))
}
