//! Episode/stream resolution: episodes, then servers for one episode, then
//! the stream link for one server.
//!
//! The stage operations (`load_episodes`, `load_servers`, `resolve_stream`)
//! are stateless. The orchestrating calls (`open_anime`, `play_episode`,
//! `step`, `switch_server`) each take a fresh generation ticket and write the
//! shared [`ResolutionContext`] only while that ticket is still current, so a
//! superseded resolution can never overwrite a newer one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{Upstream, endpoints, envelope_results};
use crate::error::{ResolutionError, ResolutionErrorKind, Result, Stage};
use crate::normalize;
use crate::types::{AudioTrack, Episode, ServerOption, StreamTarget};

mod context;

use context::{Generations, Ticket};
pub use context::{Direction, Phase, ResolutionContext};

pub const EPISODE_DELIMITER: &str = "?ep=";

/// Upstream-native episode id. Composite ids keep only the part after
/// [`EPISODE_DELIMITER`]; the servers and stream endpoints return nothing for
/// the composite form.
pub fn select_episode(episode: &Episode) -> Result<String> {
    let invalid = || {
        ResolutionError::new(
            Stage::Episode,
            ResolutionErrorKind::InvalidEpisodeId(episode.id.clone()),
        )
    };
    match episode.id.split_once(EPISODE_DELIMITER) {
        Some((_, clean)) if clean.trim().is_empty() => Err(invalid()),
        Some((_, clean)) => Ok(clean.trim().to_string()),
        None if episode.id.trim().is_empty() => Err(invalid()),
        None => Ok(episode.id.clone()),
    }
}

/// First subtitled server, else the first server in upstream order.
pub fn select_default_server(servers: &[ServerOption]) -> Option<&ServerOption> {
    servers
        .iter()
        .find(|s| s.audio_track == AudioTrack::Sub)
        .or_else(|| servers.first())
}

/// Servers grouped for display: sub, dub, then other. Each group keeps the
/// upstream order and empty groups are left out.
pub fn group_servers(servers: &[ServerOption]) -> Vec<(AudioTrack, Vec<&ServerOption>)> {
    [AudioTrack::Sub, AudioTrack::Dub, AudioTrack::Other]
        .into_iter()
        .map(|track| {
            let group: Vec<&ServerOption> =
                servers.iter().filter(|s| s.audio_track == track).collect();
            (track, group)
        })
        .filter(|(_, group)| !group.is_empty())
        .collect()
}

/// The episode numbered `number`, or the first one when there is no match.
pub fn pick_episode(episodes: &[Episode], number: Option<u32>) -> Option<&Episode> {
    number
        .and_then(|n| episodes.iter().find(|ep| ep.number == n))
        .or_else(|| episodes.first())
}

/// Everything a view needs to start playback.
#[derive(Debug, Clone)]
pub struct Playback {
    pub anime_id: String,
    pub episode: Episode,
    pub episode_id: String,
    pub servers: Vec<ServerOption>,
    pub server: ServerOption,
    pub stream: StreamTarget,
}

pub struct Resolver<A> {
    upstream: A,
    subtitle_language: String,
    generations: Generations,
    context: Mutex<ResolutionContext>,
}

impl<A: Upstream> Resolver<A> {
    pub fn new(upstream: A, subtitle_language: impl Into<String>) -> Self {
        Self {
            upstream,
            subtitle_language: subtitle_language.into(),
            generations: Generations::default(),
            context: Mutex::new(ResolutionContext::default()),
        }
    }

    #[cfg(test)]
    pub fn upstream(&self) -> &A {
        &self.upstream
    }

    /// Snapshot of the current session state.
    pub fn context(&self) -> ResolutionContext {
        self.lock().clone()
    }

    pub async fn load_episodes(&self, anime_id: &str) -> Result<Vec<Episode>> {
        let stage = Stage::Episodes;
        debug!(anime_id, "loading episodes");
        let body = self
            .upstream
            .get(&endpoints::episodes(anime_id), &[])
            .await
            .map_err(|err| ResolutionError::new(stage, err))?;
        let results = envelope_results(&body).map_err(|msg| ResolutionError::malformed(stage, msg))?;
        let raw = results
            .get("episodes")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolutionError::malformed(stage, "response has no episode list"))?;

        let episodes: Vec<Episode> = raw
            .iter()
            .map(normalize::episode)
            .filter(|ep| {
                if ep.id.is_empty() {
                    warn!(anime_id, number = ep.number, "dropping episode without an id");
                }
                !ep.id.is_empty()
            })
            .collect();
        if episodes.is_empty() {
            return Err(ResolutionError::new(stage, ResolutionErrorKind::NoEpisodes));
        }
        debug!(anime_id, count = episodes.len(), "episodes loaded");
        Ok(episodes)
    }

    pub async fn load_servers(&self, anime_id: &str, episode_id: &str) -> Result<Vec<ServerOption>> {
        let stage = Stage::Servers;
        debug!(anime_id, episode_id, "loading servers");
        let body = self
            .upstream
            .get(&endpoints::servers(anime_id), &[("ep", episode_id)])
            .await
            .map_err(|err| ResolutionError::new(stage, err))?;
        let results = envelope_results(&body).map_err(|msg| ResolutionError::malformed(stage, msg))?;
        let raw = results
            .as_array()
            .ok_or_else(|| ResolutionError::malformed(stage, "server list is not an array"))?;

        let servers: Vec<ServerOption> = raw
            .iter()
            .map(normalize::server)
            .filter(|server| {
                if server.server_id.is_empty() {
                    warn!(episode_id, "dropping server without an id");
                }
                !server.server_id.is_empty()
            })
            .collect();
        if servers.is_empty() {
            return Err(ResolutionError::new(stage, ResolutionErrorKind::NoServers));
        }
        Ok(servers)
    }

    pub async fn resolve_stream(
        &self,
        anime_id: &str,
        server_id: &str,
        episode_id: &str,
        audio_track: AudioTrack,
    ) -> Result<StreamTarget> {
        let stage = Stage::Stream;
        debug!(anime_id, server_id, episode_id, track = audio_track.as_str(), "resolving stream");
        let body = self
            .upstream
            .get(
                endpoints::STREAM,
                &[
                    ("id", anime_id),
                    ("server", server_id),
                    ("type", audio_track.as_str()),
                    ("ep", episode_id),
                ],
            )
            .await
            .map_err(|err| ResolutionError::new(stage, err))?;
        let results = envelope_results(&body).map_err(|msg| ResolutionError::malformed(stage, msg))?;

        let link = results.pointer("/streamingLink/0");
        let tracks = normalize::subtitle_tracks(
            link.and_then(|l| l.get("tracks")),
            &self.subtitle_language,
        );
        link.and_then(|l| normalize::text(l, &["/link/file"]))
            .and_then(|file| StreamTarget::new(file, tracks))
            .ok_or_else(|| ResolutionError::new(stage, ResolutionErrorKind::NoStreamLink))
    }

    /// Full pipeline for a freshly opened title: episodes, the requested
    /// episode (or the first), its servers, the default server's stream.
    pub async fn open_anime(&self, anime_id: &str, episode_number: Option<u32>) -> Result<Playback> {
        let ticket = self.begin(|ctx| *ctx = ResolutionContext::for_anime(anime_id));

        let episodes = self
            .load_episodes(anime_id)
            .await
            .map_err(|err| self.fail(ticket, err))?;
        let episode = pick_episode(&episodes, episode_number)
            .cloned()
            .ok_or_else(|| {
                self.fail(
                    ticket,
                    ResolutionError::new(Stage::Episodes, ResolutionErrorKind::NoEpisodes),
                )
            })?;
        if let Some(wanted) = episode_number.filter(|n| *n != episode.number) {
            debug!(wanted, using = episode.number, "episode not found, using the first");
        }
        self.commit(ticket, Stage::Episodes, |ctx| {
            ctx.episodes = episodes;
            ctx.phase = Phase::EpisodesLoaded;
        })?;

        self.resolve_from(ticket, anime_id.to_string(), episode).await
    }

    /// Re-runs the pipeline from episode selection, reusing the cached
    /// episode list.
    pub async fn play_episode(&self, episode: &Episode) -> Result<Playback> {
        let mut anime_id = None;
        let ticket = self.begin(|ctx| anime_id = ctx.anime_id.clone());
        let anime_id = anime_id.ok_or_else(|| {
            self.fail(
                ticket,
                ResolutionError::new(Stage::Episode, ResolutionErrorKind::NothingSelected),
            )
        })?;
        self.resolve_from(ticket, anime_id, episode.clone()).await
    }

    /// Plays the neighbouring episode. `Ok(None)` when there is none.
    pub async fn step(&self, direction: Direction) -> Result<Option<Playback>> {
        let Some(episode) = self.context().adjacent(direction).cloned() else {
            return Ok(None);
        };
        self.play_episode(&episode).await.map(Some)
    }

    /// User-initiated fallback to another server of the current episode.
    /// Only servers listed for that episode are accepted.
    pub async fn switch_server(&self, server: &ServerOption) -> Result<StreamTarget> {
        let mut selection = None;
        let mut offered = false;
        let ticket = self.begin(|ctx| {
            selection = ctx.anime_id.clone().zip(ctx.episode_id.clone());
            offered = ctx.servers.contains(server);
        });
        let (anime_id, episode_id) = selection.ok_or_else(|| {
            self.fail(
                ticket,
                ResolutionError::new(Stage::Stream, ResolutionErrorKind::NothingSelected),
            )
        })?;
        if !offered {
            return Err(self.fail(
                ticket,
                ResolutionError::new(
                    Stage::Servers,
                    ResolutionErrorKind::UnknownServer(server.server_id.clone()),
                ),
            ));
        }
        self.stream_for(ticket, &anime_id, &episode_id, server).await
    }

    /// Navigating away: cancels whatever is in flight and clears the session.
    pub fn reset(&self) {
        self.begin(|ctx| *ctx = ResolutionContext::default());
    }

    async fn resolve_from(&self, ticket: Ticket, anime_id: String, episode: Episode) -> Result<Playback> {
        let episode_id = select_episode(&episode).map_err(|err| self.fail(ticket, err))?;
        self.commit(ticket, Stage::Servers, |ctx| {
            ctx.episode_id = Some(episode_id.clone());
            ctx.servers.clear();
            ctx.server = None;
            ctx.stream = None;
            ctx.last_error = None;
            ctx.phase = Phase::ServersLoading;
        })?;

        let servers = self
            .load_servers(&anime_id, &episode_id)
            .await
            .map_err(|err| self.fail(ticket, err))?;
        let server = select_default_server(&servers).cloned().ok_or_else(|| {
            self.fail(
                ticket,
                ResolutionError::new(Stage::Servers, ResolutionErrorKind::NoServers),
            )
        })?;
        self.commit(ticket, Stage::Servers, |ctx| {
            ctx.servers = servers.clone();
            ctx.server = Some(server.clone());
            ctx.phase = Phase::ServersLoaded;
        })?;

        let stream = self.stream_for(ticket, &anime_id, &episode_id, &server).await?;
        Ok(Playback {
            anime_id,
            episode,
            episode_id,
            servers,
            server,
            stream,
        })
    }

    async fn stream_for(
        &self,
        ticket: Ticket,
        anime_id: &str,
        episode_id: &str,
        server: &ServerOption,
    ) -> Result<StreamTarget> {
        self.commit(ticket, Stage::Stream, |ctx| {
            ctx.server = Some(server.clone());
            ctx.stream = None;
            ctx.last_error = None;
            ctx.phase = Phase::StreamLoading;
        })?;
        let stream = self
            .resolve_stream(anime_id, &server.server_id, episode_id, server.audio_track)
            .await
            .map_err(|err| self.fail(ticket, err))?;
        self.commit(ticket, Stage::Stream, |ctx| {
            ctx.stream = Some(stream.clone());
            ctx.phase = Phase::StreamReady;
        })?;
        info!(
            anime_id,
            episode_id,
            server = server.server_id.as_str(),
            subtitles = stream.subtitle_tracks().len(),
            "stream ready"
        );
        Ok(stream)
    }

    fn lock(&self) -> MutexGuard<'_, ResolutionContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new generation and applies its initial state atomically.
    fn begin(&self, init: impl FnOnce(&mut ResolutionContext)) -> Ticket {
        let mut ctx = self.lock();
        let ticket = self.generations.advance();
        init(&mut ctx);
        ticket
    }

    fn commit(
        &self,
        ticket: Ticket,
        stage: Stage,
        update: impl FnOnce(&mut ResolutionContext),
    ) -> Result<()> {
        let mut ctx = self.lock();
        if !self.generations.is_current(ticket) {
            debug!(%stage, "discarding superseded result");
            return Err(ResolutionError::superseded(stage));
        }
        update(&mut ctx);
        Ok(())
    }

    /// Records a failure in the context, unless the ticket is stale, in which
    /// case the failure is discarded as superseded.
    fn fail(&self, ticket: Ticket, err: ResolutionError) -> ResolutionError {
        let mut ctx = self.lock();
        if !self.generations.is_current(ticket) {
            return ResolutionError::superseded(err.stage);
        }
        if !err.is_superseded() {
            warn!(stage = %err.stage, error = %err.kind, "resolution failed");
            ctx.phase = Phase::Error(err.stage);
            ctx.last_error = Some(err.to_string());
        }
        err
    }
}
