use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dialoguer::{Select, theme::ColorfulTheme};
use dirs_next::data_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::types::AudioTrack;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryEntry {
    pub anime_id: String,
    pub title: String,
    /// Clean episode id, as sent to the servers endpoint.
    pub episode_id: String,
    pub episode_number: u32,
    pub audio_track: AudioTrack,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

impl History {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read history file {}", path.display()))?;
        let history = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse history file {}", path.display()))?;
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("failed to write history file {}", path.display()))?;
        Ok(())
    }

    /// Most recent first; one entry per title.
    pub fn upsert(&mut self, entry: HistoryEntry) {
        if let Some(pos) = self.entries.iter().position(|e| e.anime_id == entry.anime_id) {
            self.entries.remove(pos);
        }
        self.entries.insert(0, entry);
    }

    pub fn last_episode(&self, anime_id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.anime_id == anime_id)
            .map(|e| e.episode_number)
    }

    pub fn select_entry(&self) -> Result<Option<HistoryEntry>> {
        if self.entries.is_empty() {
            println!("History is empty.");
            return Ok(None);
        }

        let items: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "[{}] {} \u{00b7} episode {} \u{00b7} watched {}",
                    entry.audio_track.label(),
                    entry.title,
                    entry.episode_number,
                    entry.watched_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();

        let selection = Select::with_theme(&theme())
            .with_prompt("Select an entry to resume (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.map(|idx| self.entries[idx].clone()))
    }
}

pub fn history_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("anistream").join("history.json"))
}

pub fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(anime_id: &str, episode_number: u32) -> HistoryEntry {
        HistoryEntry {
            anime_id: anime_id.to_string(),
            title: anime_id.to_uppercase(),
            episode_id: format!("{}", 1000 + episode_number),
            episode_number,
            audio_track: AudioTrack::Sub,
            watched_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_moves_title_to_front() {
        let mut history = History::default();
        history.upsert(entry("a", 1));
        history.upsert(entry("b", 4));
        history.upsert(entry("a", 2));
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[0].anime_id, "a");
        assert_eq!(history.last_episode("a"), Some(2));
        assert_eq!(history.last_episode("b"), Some(4));
        assert_eq!(history.last_episode("c"), None);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("anistream-history-{}", std::process::id()))
            .join("history.json");
        let mut history = History::default();
        history.upsert(entry("frieren", 7));
        history.save(&path).unwrap();

        let loaded = History::load(&path).unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].episode_id, "1007");
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_is_empty_history() {
        let path = std::env::temp_dir().join("anistream-does-not-exist").join("history.json");
        assert!(History::load(&path).unwrap().entries.is_empty());
    }
}
