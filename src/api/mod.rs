use serde_json::Value;

use crate::error::FetchError;

pub mod catalog;
pub mod client;

/// A source of upstream JSON: one GET of `path` (relative to the configured
/// base URL) with string query parameters.
pub trait Upstream {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError>;
}

impl<T: Upstream> Upstream for &T {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        (**self).get(path, query).await
    }
}

/// Path templates of the upstream REST API.
pub mod endpoints {
    pub const HOME: &str = "/api/";
    pub const SEARCH: &str = "/api/search";
    pub const SEARCH_SUGGEST: &str = "/api/search/suggest";
    pub const INFO: &str = "/api/info";
    pub const STREAM: &str = "/api/stream";

    pub fn episodes(anime_id: &str) -> String {
        format!("/api/episodes/{anime_id}")
    }

    pub fn servers(anime_id: &str) -> String {
        format!("/api/servers/{anime_id}")
    }

    pub fn genre(genre: &str) -> String {
        format!("/api/genre/{genre}")
    }

    pub fn category(slug: &str) -> String {
        format!("/api/{slug}")
    }
}

/// Splits the shared `{success, results}` envelope. A present `success: false`
/// is a rejection; an absent flag is tolerated.
pub fn envelope_results(body: &Value) -> Result<&Value, String> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(String::from("upstream reported success=false"));
    }
    match body.get("results") {
        Some(Value::Null) | None => Err(String::from("response has no results payload")),
        Some(results) => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_rejects_explicit_failure() {
        assert!(envelope_results(&json!({ "success": false, "results": [] })).is_err());
        assert!(envelope_results(&json!({ "success": true })).is_err());
        assert!(envelope_results(&json!({ "success": true, "results": null })).is_err());
    }

    #[test]
    fn envelope_tolerates_missing_flag() {
        let body = json!({ "results": { "episodes": [] } });
        assert_eq!(
            envelope_results(&body).unwrap(),
            &json!({ "episodes": [] })
        );
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(endpoints::episodes("demon-slayer"), "/api/episodes/demon-slayer");
        assert_eq!(endpoints::servers("demon-slayer"), "/api/servers/demon-slayer");
        assert_eq!(endpoints::category("top-airing"), "/api/top-airing");
    }
}
