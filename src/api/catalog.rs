//! Listing feeds consumed by the browse and home views: home sections,
//! categories, genres, search and suggestions, and single-title info.

use serde_json::Value;
use tracing::debug;

use super::{Upstream, endpoints, envelope_results};
use crate::config::{ListShape, Settings};
use crate::error::CatalogError;
use crate::normalize;
use crate::types::{AnimeSummary, HomeFeed, Listing};

const HOME_SECTION_LIMIT: usize = 12;
const SUGGESTION_LIMIT: usize = 5;
const DEFAULT_TOTAL_PAGES: u32 = 10;
const PAGE_WINDOW: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Category {
    MostPopular,
    TopAiring,
    Movie,
    RecentlyAdded,
    RecentlyUpdated,
    MostFavorite,
}

impl Category {
    pub fn slug(self) -> &'static str {
        match self {
            Category::MostPopular => "most-popular",
            Category::TopAiring => "top-airing",
            Category::Movie => "movie",
            Category::RecentlyAdded => "recently-added",
            Category::RecentlyUpdated => "recently-updated",
            Category::MostFavorite => "most-favorite",
        }
    }
}

/// Browse-page filters. Only one endpoint can serve a request, so the
/// filters are applied in a fixed priority.
#[derive(Debug, Clone, Default)]
pub struct BrowseFilters {
    pub genre: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub kind: Option<String>,
}

impl BrowseFilters {
    pub fn endpoint(&self) -> String {
        if let Some(genre) = self.genre.as_deref().filter(|g| !g.is_empty()) {
            return endpoints::genre(genre);
        }
        if self.status.as_deref() == Some("top-airing") {
            return endpoints::category(Category::TopAiring.slug());
        }
        match self.sort.as_deref() {
            Some("recently-added") => return endpoints::category(Category::RecentlyAdded.slug()),
            Some("recently-updated") => {
                return endpoints::category(Category::RecentlyUpdated.slug());
            }
            Some("most-favorite") => return endpoints::category(Category::MostFavorite.slug()),
            _ => {}
        }
        if self.kind.as_deref() == Some("movie") {
            return endpoints::category(Category::Movie.slug());
        }
        endpoints::category(Category::MostPopular.slug())
    }
}

/// Page numbers to offer around `current`: at most five, clamped to
/// `1..=total`.
pub fn page_window(current: u32, total: u32) -> Vec<u32> {
    let total = total.max(1);
    let current = current.clamp(1, total);
    let mut start = current.saturating_sub(PAGE_WINDOW / 2).max(1);
    let end = (start + PAGE_WINDOW - 1).min(total);
    if end - start < PAGE_WINDOW - 1 {
        start = end.saturating_sub(PAGE_WINDOW - 1).max(1);
    }
    (start..=end).collect()
}

pub struct Catalog<A> {
    upstream: A,
    search_shape: ListShape,
    listing_shape: ListShape,
}

impl<A: Upstream> Catalog<A> {
    pub fn new(upstream: A, settings: &Settings) -> Self {
        Self {
            upstream,
            search_shape: settings.search_shape,
            listing_shape: settings.listing_shape,
        }
    }

    pub async fn home(&self) -> Result<HomeFeed, CatalogError> {
        let body = self.upstream.get(endpoints::HOME, &[]).await?;
        let results = envelope_results(&body).map_err(CatalogError::Malformed)?;
        let section = |key: &str| -> Vec<AnimeSummary> {
            results
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .take(HOME_SECTION_LIMIT)
                        .map(normalize::anime)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(HomeFeed {
            trending: section("trending"),
            most_popular: section("mostPopular"),
            top_airing: section("topAiring"),
            latest_episodes: section("latestEpisode"),
        })
    }

    pub async fn category(&self, category: Category, page: u32) -> Result<Listing, CatalogError> {
        self.listing(&endpoints::category(category.slug()), page).await
    }

    pub async fn genre(&self, genre: &str, page: u32) -> Result<Listing, CatalogError> {
        self.listing(&endpoints::genre(genre), page).await
    }

    pub async fn browse(&self, filters: &BrowseFilters, page: u32) -> Result<Listing, CatalogError> {
        self.listing(&filters.endpoint(), page).await
    }

    pub async fn search(&self, keyword: &str, page: u32) -> Result<Listing, CatalogError> {
        let page_str = page.max(1).to_string();
        let body = self
            .upstream
            .get(
                endpoints::SEARCH,
                &[("keyword", keyword), ("page", page_str.as_str())],
            )
            .await?;
        listing_from(&body, self.search_shape, page)
    }

    pub async fn suggest(&self, keyword: &str) -> Result<Vec<AnimeSummary>, CatalogError> {
        let body = self
            .upstream
            .get(endpoints::SEARCH_SUGGEST, &[("keyword", keyword)])
            .await?;
        let mut listing = listing_from(&body, self.search_shape, 1)?;
        listing.items.truncate(SUGGESTION_LIMIT);
        Ok(listing.items)
    }

    pub async fn info(&self, anime_id: &str) -> Result<AnimeSummary, CatalogError> {
        let body = self.upstream.get(endpoints::INFO, &[("id", anime_id)]).await?;
        let results = envelope_results(&body).map_err(CatalogError::Malformed)?;
        let data = results
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| CatalogError::Malformed(String::from("info response has no data object")))?;
        Ok(normalize::anime(data))
    }

    async fn listing(&self, path: &str, page: u32) -> Result<Listing, CatalogError> {
        let page_str = page.max(1).to_string();
        let body = self.upstream.get(path, &[("page", page_str.as_str())]).await?;
        listing_from(&body, self.listing_shape, page)
    }
}

fn listing_from(body: &Value, shape: ListShape, page: u32) -> Result<Listing, CatalogError> {
    let results = envelope_results(body).map_err(CatalogError::Malformed)?;
    let items = match shape {
        ListShape::Wrapped => results.get("data"),
        ListShape::Bare => Some(results),
    }
    .and_then(Value::as_array)
    .ok_or_else(|| {
        CatalogError::Malformed(format!(
            "expected a {} result list",
            match shape {
                ListShape::Wrapped => "results.data",
                ListShape::Bare => "bare results",
            }
        ))
    })?;

    let total_pages = normalize::count(results, &["/totalPages", "/totalPage"])
        .unwrap_or(DEFAULT_TOTAL_PAGES);
    debug!(items = items.len(), page, total_pages, "listing page");
    Ok(Listing {
        items: items.iter().map(normalize::anime).collect(),
        page: page.max(1),
        total_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::json;
    use std::cell::RefCell;

    struct Canned {
        body: Value,
        seen: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl Canned {
        fn new(body: Value) -> Self {
            Self {
                body,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Upstream for Canned {
        async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
            self.seen.borrow_mut().push((
                path.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            Ok(self.body.clone())
        }
    }

    fn catalog(body: Value, search_shape: ListShape) -> Catalog<Canned> {
        let settings = Settings {
            search_shape,
            ..Settings::default()
        };
        Catalog::new(Canned::new(body), &settings)
    }

    #[test]
    fn filter_priority() {
        let mut filters = BrowseFilters {
            genre: Some("action".into()),
            status: Some("top-airing".into()),
            sort: Some("most-favorite".into()),
            kind: Some("movie".into()),
        };
        assert_eq!(filters.endpoint(), "/api/genre/action");
        filters.genre = None;
        assert_eq!(filters.endpoint(), "/api/top-airing");
        filters.status = None;
        assert_eq!(filters.endpoint(), "/api/most-favorite");
        filters.sort = Some("most-popular".into());
        assert_eq!(filters.endpoint(), "/api/movie");
        assert_eq!(BrowseFilters::default().endpoint(), "/api/most-popular");
    }

    #[test]
    fn page_window_is_clamped() {
        assert_eq!(page_window(1, 10), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_window(6, 10), vec![4, 5, 6, 7, 8]);
        assert_eq!(page_window(10, 10), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_window(2, 3), vec![1, 2, 3]);
        assert_eq!(page_window(0, 0), vec![1]);
    }

    #[tokio::test]
    async fn wrapped_listing_with_default_total_pages() {
        let catalog = catalog(
            json!({ "success": true, "results": { "data": [{ "id": "a", "title": "A" }, { "name": "B" }] } }),
            ListShape::Wrapped,
        );
        let listing = catalog.category(Category::TopAiring, 2).await.unwrap();
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[1].title, "B");
        assert_eq!(listing.page, 2);
        assert_eq!(listing.total_pages, DEFAULT_TOTAL_PAGES);
        let seen = catalog.upstream.seen.borrow();
        assert_eq!(seen[0].0, "/api/top-airing");
        assert_eq!(seen[0].1, vec![("page".to_string(), "2".to_string())]);
    }

    #[tokio::test]
    async fn search_shape_is_configured_not_guessed() {
        let bare = json!({ "success": true, "results": [{ "id": "x" }] });
        let listing = catalog(bare.clone(), ListShape::Bare)
            .search("naruto", 1)
            .await
            .unwrap();
        assert_eq!(listing.items[0].id, "x");

        let err = catalog(bare, ListShape::Wrapped)
            .search("naruto", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Malformed(_)));
    }

    #[tokio::test]
    async fn home_sections_are_truncated_and_optional() {
        let trending: Vec<Value> = (0..20).map(|i| json!({ "id": format!("t{i}") })).collect();
        let catalog = catalog(
            json!({ "success": true, "results": { "trending": trending, "topAiring": [{ "id": "air" }] } }),
            ListShape::Wrapped,
        );
        let feed = catalog.home().await.unwrap();
        assert_eq!(feed.trending.len(), HOME_SECTION_LIMIT);
        assert!(feed.most_popular.is_empty());
        assert_eq!(feed.top_airing[0].id, "air");
        assert!(feed.latest_episodes.is_empty());
    }

    #[tokio::test]
    async fn suggestions_keep_top_five() {
        let data: Vec<Value> = (0..8).map(|i| json!({ "id": i })).collect();
        let catalog = catalog(
            json!({ "success": true, "results": { "data": data, "totalPages": 3 } }),
            ListShape::Wrapped,
        );
        let items = catalog.suggest("one").await.unwrap();
        assert_eq!(items.len(), SUGGESTION_LIMIT);
        assert_eq!(items[4].id, "4");
    }

    #[tokio::test]
    async fn info_requires_data_object() {
        let ok = catalog(
            json!({ "success": true, "results": { "data": { "id": "frieren", "title": "Frieren" } } }),
            ListShape::Wrapped,
        );
        assert_eq!(ok.info("frieren").await.unwrap().title, "Frieren");

        let missing = catalog(json!({ "success": true, "results": {} }), ListShape::Wrapped);
        assert!(matches!(
            missing.info("frieren").await,
            Err(CatalogError::Malformed(_))
        ));
    }
}
