//! Field-resolution rules that fold the upstream's mixed schema versions into
//! the fixed entities in [`crate::types`].
//!
//! Every rule list is an ordered set of JSON pointers; the first one that
//! yields a usable value wins, otherwise the documented default applies.
//! Nothing in here fails.

use serde_json::Value;
use tracing::warn;

use crate::types::{AnimeSummary, AudioTrack, Episode, ServerOption, SubtitleTrack};

pub const TITLE_PLACEHOLDER: &str = "Untitled";
pub const POSTER_PLACEHOLDER: &str =
    "https://via.placeholder.com/200x280/ff6b9d/ffffff?text=No+Image";
pub const DEFAULT_RATING: f64 = 8.0;
pub const DEFAULT_SHOW_TYPE: &str = "TV";

const ANIME_ID: &[&str] = &["/id", "/data_id"];
const ANIME_TITLE: &[&str] = &["/title", "/name"];
const ANIME_POSTER: &[&str] = &["/poster"];
const ANIME_RATING: &[&str] = &["/tvInfo/MAL Score", "/tvInfo/rating"];
const ANIME_SHOW_TYPE: &[&str] = &["/tvInfo/showType"];
const ANIME_EPISODES: &[&str] = &["/tvInfo/eps", "/tvInfo/sub"];

const EPISODE_ID: &[&str] = &["/id", "/data_id"];
const EPISODE_NUMBER: &[&str] = &["/episode_no", "/number"];
const EPISODE_TITLE: &[&str] = &["/title", "/name"];
const EPISODE_JAPANESE_TITLE: &[&str] = &["/jname", "/japanese_title"];

const SERVER_ID: &[&str] = &["/server_id", "/data_id"];
const SERVER_NAME: &[&str] = &["/serverName", "/server_name"];
const SERVER_TYPE: &[&str] = &["/type"];

const TRACK_FILE: &[&str] = &["/file", "/url"];
const TRACK_LABEL: &[&str] = &["/label"];
const TRACK_LANGUAGE: &[&str] = &["/language", "/lang", "/srclang"];

pub fn anime(raw: &Value) -> AnimeSummary {
    AnimeSummary {
        id: text(raw, ANIME_ID).unwrap_or_default(),
        title: text(raw, ANIME_TITLE).unwrap_or_else(|| TITLE_PLACEHOLDER.to_string()),
        poster_url: text(raw, ANIME_POSTER).unwrap_or_else(|| POSTER_PLACEHOLDER.to_string()),
        rating: number(raw, ANIME_RATING).unwrap_or(DEFAULT_RATING),
        show_type: text(raw, ANIME_SHOW_TYPE).unwrap_or_else(|| DEFAULT_SHOW_TYPE.to_string()),
        episode_count: count(raw, ANIME_EPISODES).unwrap_or(0),
    }
}

pub fn episode(raw: &Value) -> Episode {
    Episode {
        id: text(raw, EPISODE_ID).unwrap_or_default(),
        number: count(raw, EPISODE_NUMBER).unwrap_or(1),
        title: text(raw, EPISODE_TITLE).unwrap_or_default(),
        japanese_title: text(raw, EPISODE_JAPANESE_TITLE).unwrap_or_default(),
    }
}

pub fn server(raw: &Value) -> ServerOption {
    ServerOption {
        server_id: text(raw, SERVER_ID).unwrap_or_default(),
        server_name: text(raw, SERVER_NAME),
        audio_track: audio_track(text(raw, SERVER_TYPE).as_deref()),
    }
}

/// Untyped servers are treated as subtitled, matching what the watch page
/// requests when the field is missing.
pub fn audio_track(kind: Option<&str>) -> AudioTrack {
    match kind.map(str::trim) {
        None => AudioTrack::Sub,
        Some(k) if k.eq_ignore_ascii_case("sub") => AudioTrack::Sub,
        Some(k) if k.eq_ignore_ascii_case("dub") => AudioTrack::Dub,
        Some(_) => AudioTrack::Other,
    }
}

/// Subtitle tracks from a streaming-link entry. Entries without a file and
/// thumbnail sprites are skipped before positional labels are assigned.
pub fn subtitle_tracks(raw: Option<&Value>, default_language: &str) -> Vec<SubtitleTrack> {
    let Some(entries) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    let usable: Vec<(&Value, String)> = entries
        .iter()
        .filter(|entry| {
            let kind = text(entry, &["/kind"]);
            !matches!(kind.as_deref(), Some(k) if k.eq_ignore_ascii_case("thumbnails"))
        })
        .filter_map(|entry| text(entry, TRACK_FILE).map(|file| (entry, file)))
        .collect();
    let dropped = entries.len() - usable.len();
    if dropped > 0 {
        warn!(
            dropped,
            kept = usable.len(),
            "dropping subtitle tracks without a file or marked as thumbnails"
        );
    }

    usable
        .into_iter()
        .enumerate()
        .map(|(idx, (entry, file_url))| SubtitleTrack {
            label: text(entry, TRACK_LABEL).unwrap_or_else(|| format!("Sub {}", idx + 1)),
            language: text(entry, TRACK_LANGUAGE).unwrap_or_else(|| default_language.to_string()),
            file_url,
        })
        .collect()
}

/// First non-empty string (or number, rendered as text) among `rules`.
pub fn text(raw: &Value, rules: &[&str]) -> Option<String> {
    rules.iter().find_map(|ptr| match raw.pointer(ptr)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First finite, positive number among `rules`. Numeric strings count;
/// anything else falls through to the next rule.
pub fn number(raw: &Value, rules: &[&str]) -> Option<f64> {
    rules.iter().find_map(|ptr| {
        let value = match raw.pointer(ptr)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (value.is_finite() && value > 0.0).then_some(value)
    })
}

/// First strictly positive whole number among `rules`.
pub fn count(raw: &Value, rules: &[&str]) -> Option<u32> {
    rules.iter().find_map(|ptr| {
        let value = number(raw, &[*ptr])?;
        (value >= 1.0 && value <= f64::from(u32::MAX)).then(|| value.trunc() as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anime_prefers_primary_fields() {
        let raw = json!({
            "id": "one-piece-100",
            "data_id": "100",
            "title": "One Piece",
            "name": "Wan Pisu",
            "poster": "https://img/op.jpg",
            "tvInfo": { "MAL Score": "8.72", "rating": "PG-13", "showType": "TV", "eps": 1100, "sub": 1120 }
        });
        let summary = anime(&raw);
        assert_eq!(summary.id, "one-piece-100");
        assert_eq!(summary.title, "One Piece");
        assert_eq!(summary.poster_url, "https://img/op.jpg");
        assert!((summary.rating - 8.72).abs() < f64::EPSILON);
        assert_eq!(summary.show_type, "TV");
        assert_eq!(summary.episode_count, 1100);
    }

    #[test]
    fn anime_falls_back_through_rules() {
        let raw = json!({
            "data_id": 4242,
            "name": "Frieren",
            "tvInfo": { "rating": 9.1, "sub": "28" }
        });
        let summary = anime(&raw);
        assert_eq!(summary.id, "4242");
        assert_eq!(summary.title, "Frieren");
        assert!((summary.rating - 9.1).abs() < f64::EPSILON);
        assert_eq!(summary.episode_count, 28);
        assert_eq!(summary.poster_url, POSTER_PLACEHOLDER);
    }

    #[test]
    fn missing_title_uses_placeholder() {
        for raw in [json!({}), json!({ "title": "" }), json!({ "title": null, "name": "  " })] {
            assert_eq!(anime(&raw).title, TITLE_PLACEHOLDER);
        }
    }

    #[test]
    fn non_numeric_rating_is_default() {
        for raw in [
            json!({}),
            json!({ "tvInfo": null }),
            json!({ "tvInfo": { "MAL Score": "?" } }),
            json!({ "tvInfo": { "MAL Score": "N/A", "rating": "PG-13" } }),
            json!({ "tvInfo": { "rating": [8.5] } }),
            json!({ "tvInfo": { "MAL Score": 0 } }),
            json!({ "tvInfo": { "MAL Score": -3.5 } }),
            json!({ "tvInfo": { "MAL Score": "-1", "rating": "-2" } }),
        ] {
            assert_eq!(anime(&raw).rating, DEFAULT_RATING, "input: {raw}");
        }
    }

    #[test]
    fn negative_rating_falls_through_to_next_rule() {
        let raw = json!({ "tvInfo": { "MAL Score": -3.5, "rating": "7.5" } });
        assert!((anime(&raw).rating - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn anime_defaults_on_empty_record() {
        let summary = anime(&json!("not an object"));
        assert_eq!(summary.id, "");
        assert_eq!(summary.show_type, DEFAULT_SHOW_TYPE);
        assert_eq!(summary.episode_count, 0);
    }

    #[test]
    fn episode_number_defaults_to_one() {
        let ep = episode(&json!({ "id": "x?ep=5", "episode_no": "abc" }));
        assert_eq!(ep.number, 1);
        let ep = episode(&json!({ "id": "x?ep=5", "episode_no": -3 }));
        assert_eq!(ep.number, 1);
        let ep = episode(&json!({ "data_id": "5", "number": 7, "name": "Start", "jname": "Hajimari" }));
        assert_eq!(ep.id, "5");
        assert_eq!(ep.number, 7);
        assert_eq!(ep.title, "Start");
        assert_eq!(ep.japanese_title, "Hajimari");
    }

    #[test]
    fn server_audio_track_mapping() {
        assert_eq!(server(&json!({ "server_id": "1" })).audio_track, AudioTrack::Sub);
        assert_eq!(server(&json!({ "server_id": "1", "type": "DUB" })).audio_track, AudioTrack::Dub);
        assert_eq!(server(&json!({ "server_id": "1", "type": "raw" })).audio_track, AudioTrack::Other);
        let s = server(&json!({ "server_id": 4, "serverName": "HD-1", "type": "sub" }));
        assert_eq!(s.server_id, "4");
        assert_eq!(s.server_name.as_deref(), Some("HD-1"));
    }

    #[test]
    fn subtitle_tracks_get_positional_labels() {
        let raw = json!([
            { "file": "https://cdn/thumbs.vtt", "kind": "thumbnails" },
            { "file": "https://cdn/en.vtt", "label": "English" },
            { "label": "broken" },
            { "file": "https://cdn/2.vtt" },
            { "file": "https://cdn/es.vtt", "language": "es" }
        ]);
        let tracks = subtitle_tracks(Some(&raw), "en");
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].label, "English");
        assert_eq!(tracks[0].language, "en");
        assert_eq!(tracks[1].label, "Sub 2");
        assert_eq!(tracks[1].file_url, "https://cdn/2.vtt");
        assert_eq!(tracks[2].label, "Sub 3");
        assert_eq!(tracks[2].language, "es");
    }

    #[test]
    fn absent_subtitles_are_empty() {
        assert!(subtitle_tracks(None, "en").is_empty());
        assert!(subtitle_tracks(Some(&json!({ "file": "x" })), "en").is_empty());
    }
}
