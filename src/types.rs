use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioTrack {
    Sub,
    Dub,
    Other,
}

impl AudioTrack {
    /// Value sent as the `type` query parameter of the stream endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            AudioTrack::Sub => "sub",
            AudioTrack::Dub => "dub",
            AudioTrack::Other => "raw",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AudioTrack::Sub => "Sub",
            AudioTrack::Dub => "Dub",
            AudioTrack::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimeSummary {
    pub id: String,
    pub title: String,
    pub poster_url: String,
    pub rating: f64,
    pub show_type: String,
    pub episode_count: u32,
}

impl AnimeSummary {
    pub fn label(&self) -> String {
        format!(
            "{} [{} \u{00b7} {} eps \u{00b7} {:.1}]",
            self.title, self.show_type, self.episode_count, self.rating
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Upstream id, possibly composite (`"<anime>?ep=<episode>"`).
    pub id: String,
    pub number: u32,
    pub title: String,
    pub japanese_title: String,
}

impl Episode {
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("Episode {}", self.number)
        } else {
            format!("Episode {}: {}", self.number, self.title)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOption {
    pub server_id: String,
    pub server_name: Option<String>,
    pub audio_track: AudioTrack,
}

impl ServerOption {
    pub fn display_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.server_id)
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name(), self.audio_track.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub label: String,
    pub language: String,
    pub file_url: String,
}

/// A playable stream. Only constructible with a non-empty video URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    video_url: String,
    subtitle_tracks: Vec<SubtitleTrack>,
}

impl StreamTarget {
    pub fn new(video_url: impl Into<String>, subtitle_tracks: Vec<SubtitleTrack>) -> Option<Self> {
        let video_url = video_url.into();
        if video_url.trim().is_empty() {
            return None;
        }
        Some(Self {
            video_url,
            subtitle_tracks,
        })
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn subtitle_tracks(&self) -> &[SubtitleTrack] {
        &self.subtitle_tracks
    }
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub items: Vec<AnimeSummary>,
    pub page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Default)]
pub struct HomeFeed {
    pub trending: Vec<AnimeSummary>,
    pub most_popular: Vec<AnimeSummary>,
    pub top_airing: Vec<AnimeSummary>,
    pub latest_episodes: Vec<AnimeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_target_requires_video_url() {
        assert!(StreamTarget::new("", Vec::new()).is_none());
        assert!(StreamTarget::new("   ", Vec::new()).is_none());
        let target = StreamTarget::new("https://cdn/x.m3u8", Vec::new()).unwrap();
        assert_eq!(target.video_url(), "https://cdn/x.m3u8");
        assert!(target.subtitle_tracks().is_empty());
    }

    #[test]
    fn server_name_falls_back_to_id() {
        let server = ServerOption {
            server_id: "hd-1".into(),
            server_name: None,
            audio_track: AudioTrack::Dub,
        };
        assert_eq!(server.display_name(), "hd-1");
        assert_eq!(server.label(), "hd-1 (Dub)");
    }

    #[test]
    fn episode_label_omits_empty_title() {
        let ep = Episode {
            id: "x?ep=1".into(),
            number: 3,
            title: String::new(),
            japanese_title: String::new(),
        };
        assert_eq!(ep.label(), "Episode 3");
    }
}
