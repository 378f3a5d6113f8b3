use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Stage;
use crate::types::{Episode, ServerOption, StreamTarget};

use super::select_episode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    EpisodesLoading,
    EpisodesLoaded,
    ServersLoading,
    ServersLoaded,
    StreamLoading,
    StreamReady,
    Error(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Per-session watch state. Only the resolver writes it; views read
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub anime_id: Option<String>,
    /// Clean (post-delimiter) id of the selected episode.
    pub episode_id: Option<String>,
    pub episodes: Vec<Episode>,
    pub servers: Vec<ServerOption>,
    pub server: Option<ServerOption>,
    pub stream: Option<StreamTarget>,
    pub phase: Phase,
    pub last_error: Option<String>,
}

impl ResolutionContext {
    pub fn for_anime(anime_id: &str) -> Self {
        Self {
            anime_id: Some(anime_id.to_string()),
            phase: Phase::EpisodesLoading,
            ..Self::default()
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        let current = self.episode_id.as_deref()?;
        self.episodes
            .iter()
            .position(|ep| select_episode(ep).is_ok_and(|id| id == current))
    }

    pub fn current_episode(&self) -> Option<&Episode> {
        self.current_index().and_then(|idx| self.episodes.get(idx))
    }

    /// Neighbour in list order; `None` at either end or with no selection.
    pub fn adjacent(&self, direction: Direction) -> Option<&Episode> {
        let idx = self.current_index()?;
        match direction {
            Direction::Previous => idx.checked_sub(1).and_then(|i| self.episodes.get(i)),
            Direction::Next => self.episodes.get(idx + 1),
        }
    }
}

/// Identifies one user-initiated resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Monotonic request generation; a newer ticket supersedes every older one.
#[derive(Debug, Default)]
pub struct Generations(AtomicU64);

impl Generations {
    pub fn advance(&self) -> Ticket {
        Ticket(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.0.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(id: &str, number: u32) -> Episode {
        Episode {
            id: id.to_string(),
            number,
            title: String::new(),
            japanese_title: String::new(),
        }
    }

    fn context_at(current: &str) -> ResolutionContext {
        ResolutionContext {
            anime_id: Some("show".into()),
            episode_id: Some(current.into()),
            episodes: vec![ep("show?ep=10", 1), ep("show?ep=11", 2), ep("show?ep=12", 3)],
            ..ResolutionContext::default()
        }
    }

    #[test]
    fn adjacent_episodes_follow_list_order() {
        let ctx = context_at("11");
        assert_eq!(ctx.current_episode().map(|e| e.number), Some(2));
        assert_eq!(ctx.adjacent(Direction::Previous).map(|e| e.number), Some(1));
        assert_eq!(ctx.adjacent(Direction::Next).map(|e| e.number), Some(3));
    }

    #[test]
    fn no_neighbour_past_the_ends() {
        assert!(context_at("10").adjacent(Direction::Previous).is_none());
        assert!(context_at("12").adjacent(Direction::Next).is_none());
        assert!(context_at("99").adjacent(Direction::Next).is_none());
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let generations = Generations::default();
        let first = generations.advance();
        assert!(generations.is_current(first));
        let second = generations.advance();
        assert!(!generations.is_current(first));
        assert!(generations.is_current(second));
    }
}
