use std::{future::Future, path::PathBuf, process::ExitCode};

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dialoguer::Select;
use tracing::warn;
use tracing_subscriber::EnvFilter;

type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

mod api;
mod config;
mod error;
mod history;
mod normalize;
mod player;
mod resolver;
mod types;

use api::{
    catalog::{BrowseFilters, Catalog, Category, page_window},
    client::ApiClient,
};
use config::Settings;
use error::{CatalogError, ResolutionError};
use history::{History, HistoryEntry, history_path, theme};
use resolver::{Direction, Phase, Playback, Resolver, group_servers};
use types::{AnimeSummary, AudioTrack, Listing, ServerOption};

#[derive(Debug, Parser)]
#[command(
    name = "anistream",
    about = "Browse an anime catalog and play episodes via mpv.",
    version
)]
struct Cli {
    /// Settings file (defaults to the per-user config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log resolution steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search titles by keyword
    Search {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        playback: PlaybackArgs,
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
    },
    /// Top matches for a partial title
    Suggest {
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
    },
    /// Browse a category or genre
    Browse {
        #[arg(long, value_enum, conflicts_with_all = ["genre", "status", "sort", "kind"])]
        category: Option<Category>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Trending, popular, airing and latest titles
    Home {
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Open a title by its upstream id
    Watch {
        #[arg(value_name = "ANIME_ID")]
        anime_id: String,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Resume something from the watch history
    History {
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Print the effective settings
    Config,
}

#[derive(Debug, Args, Clone)]
struct PlaybackArgs {
    /// Episode number to start from
    #[arg(short = 'e', long, value_name = "EPISODE")]
    episode: Option<u32>,

    /// Switch to a dubbed server when one exists
    #[arg(long)]
    dub: bool,

    /// Print the stream and subtitle URLs instead of playing
    #[arg(long, conflicts_with = "open")]
    print_url: bool,

    /// Hand the stream URL to the system opener instead of mpv
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            eprintln!("Run the command again to retry.");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;

    if let Command::Config = cli.command {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let client = ApiClient::new(&settings).context("failed to create HTTP client")?;
    let catalog = Catalog::new(&client, &settings);
    let resolver = Resolver::new(&client, settings.subtitle_language.clone());
    let history_path = history_path()?;
    let mut history = History::load(&history_path)?;

    let mut app = App {
        settings: &settings,
        catalog,
        resolver,
        history: &mut history,
        history_path,
    };

    match cli.command {
        Command::Search {
            page,
            playback,
            query,
        } => {
            let query = query.join(" ");
            let catalog = &app.catalog;
            let picked = pick_from_listing(|p| catalog.search(&query, p), page).await?;
            app.watch_picked(picked, &playback).await
        }
        Command::Suggest { query } => {
            let suggestions = app.catalog.suggest(&query.join(" ")).await?;
            if suggestions.is_empty() {
                println!("No suggestions.");
            }
            for item in suggestions {
                println!("{}\t{}", item.id, item.label());
            }
            Ok(())
        }
        Command::Browse {
            category,
            genre,
            status,
            sort,
            kind,
            page,
            playback,
        } => {
            let catalog = &app.catalog;
            let only_genre = status.is_none() && sort.is_none() && kind.is_none();
            let picked = match (category, genre) {
                (Some(category), _) => {
                    pick_from_listing(|p| catalog.category(category, p), page).await?
                }
                (None, Some(genre)) if only_genre => {
                    pick_from_listing(|p| catalog.genre(&genre, p), page).await?
                }
                (None, genre) => {
                    let filters = BrowseFilters {
                        genre,
                        status,
                        sort,
                        kind,
                    };
                    pick_from_listing(|p| catalog.browse(&filters, p), page).await?
                }
            };
            app.watch_picked(picked, &playback).await
        }
        Command::Home { playback } => {
            let picked = pick_from_home(&app.catalog).await?;
            app.watch_picked(picked, &playback).await
        }
        Command::Watch { anime_id, playback } => {
            let title = match app.catalog.info(&anime_id).await {
                Ok(summary) => {
                    println!("{}\n{}", summary.label(), summary.poster_url);
                    summary.title
                }
                Err(err) => {
                    warn!(anime_id = %anime_id, error = %err, "could not load title info");
                    anime_id.clone()
                }
            };
            app.watch(&anime_id, &title, &playback).await
        }
        Command::History { playback } => {
            let Some(entry) = app.history.select_entry()? else {
                return Ok(());
            };
            let playback = PlaybackArgs {
                episode: playback.episode.or(Some(entry.episode_number)),
                dub: playback.dub || entry.audio_track == AudioTrack::Dub,
                ..playback
            };
            app.watch(&entry.anime_id, &entry.title, &playback).await
        }
        Command::Config => Ok(()),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "anistream=debug"
    } else {
        "anistream=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct App<'a> {
    settings: &'a Settings,
    catalog: Catalog<&'a ApiClient>,
    resolver: Resolver<&'a ApiClient>,
    history: &'a mut History,
    history_path: PathBuf,
}

enum Action {
    Next,
    Previous,
    Pick,
    Server,
    Retry,
    Quit,
}

impl App<'_> {
    async fn watch_picked(
        &mut self,
        picked: Option<AnimeSummary>,
        playback: &PlaybackArgs,
    ) -> Result<()> {
        let Some(anime) = picked else {
            println!("Cancelled.");
            return Ok(());
        };
        let playback = PlaybackArgs {
            episode: playback
                .episode
                .or_else(|| self.history.last_episode(&anime.id)),
            ..playback.clone()
        };
        self.watch(&anime.id, &anime.title, &playback).await
    }

    async fn watch(&mut self, anime_id: &str, title: &str, args: &PlaybackArgs) -> Result<()> {
        println!("Loading {title}...");
        let opened = match self.resolver.open_anime(anime_id, args.episode).await {
            Ok(playback) if args.dub => self.prefer_dub(playback).await,
            other => other,
        };

        if args.print_url {
            let playback = opened?;
            println!("{}", playback.stream.video_url());
            for track in playback.stream.subtitle_tracks() {
                println!("{}\t{}\t{}", track.language, track.label, track.file_url);
            }
            return Ok(());
        }

        let mut outcome = Some(opened);
        loop {
            match outcome.take() {
                Some(Ok(playback)) => self.play(title, &playback, args).await?,
                Some(Err(err)) if err.is_superseded() => {}
                Some(Err(err)) => println!("{err}. Pick an action to retry."),
                None => {}
            }

            let ctx = self.resolver.context();
            let failed = matches!(ctx.phase, Phase::Error(_));
            let Some(action) = choose_action(!ctx.servers.is_empty(), failed)? else {
                return Ok(());
            };
            let next = match action {
                Action::Quit => {
                    self.resolver.reset();
                    return Ok(());
                }
                Action::Next | Action::Previous => {
                    let direction = if matches!(action, Action::Next) {
                        Direction::Next
                    } else {
                        Direction::Previous
                    };
                    match self.resolver.step(direction).await {
                        Ok(Some(playback)) => Ok(playback),
                        Ok(None) => {
                            println!("No episode in that direction.");
                            continue;
                        }
                        Err(err) => Err(err),
                    }
                }
                Action::Pick => {
                    let Some(episode) = choose_episode(&ctx.episodes, ctx.current_index())? else {
                        continue;
                    };
                    self.resolver.play_episode(&episode).await
                }
                Action::Server => {
                    // The menu and the playback both follow the episode the
                    // resolver is on, which may differ from the last one played.
                    let (Some(anime_id), Some(episode), Some(episode_id)) = (
                        ctx.anime_id.clone(),
                        ctx.current_episode().cloned(),
                        ctx.episode_id.clone(),
                    ) else {
                        continue;
                    };
                    let Some(server) = choose_server(&ctx.servers)? else {
                        continue;
                    };
                    self.resolver
                        .switch_server(&server)
                        .await
                        .map(|stream| Playback {
                            anime_id,
                            episode,
                            episode_id,
                            servers: ctx.servers,
                            server,
                            stream,
                        })
                }
                Action::Retry => {
                    match ctx.current_episode() {
                        Some(episode) => self.resolver.play_episode(episode).await,
                        None => self.resolver.open_anime(anime_id, args.episode).await,
                    }
                }
            };
            outcome = Some(next);
        }
    }

    async fn prefer_dub(&self, playback: Playback) -> Result<Playback, ResolutionError> {
        let Some(dub) = playback
            .servers
            .iter()
            .find(|s| s.audio_track == AudioTrack::Dub)
            .cloned()
        else {
            println!("No dubbed server for this episode; using {}.", playback.server.label());
            return Ok(playback);
        };
        let stream = self.resolver.switch_server(&dub).await?;
        Ok(Playback {
            server: dub,
            stream,
            ..playback
        })
    }

    async fn play(&mut self, title: &str, playback: &Playback, args: &PlaybackArgs) -> Result<()> {
        let media_title = format!("{title} - {}", playback.episode.label());
        println!(
            "Playing {media_title} from {} ({} subtitle tracks)...",
            playback.server.label(),
            playback.stream.subtitle_tracks().len()
        );
        if args.open {
            player::open_externally(&playback.stream)?;
        } else if let Err(err) =
            player::launch_player(&self.settings.player, &playback.stream, &media_title).await
        {
            println!("{err:#}");
            return Ok(());
        }

        if self.settings.history {
            self.history.upsert(HistoryEntry {
                anime_id: playback.anime_id.clone(),
                title: title.to_string(),
                episode_id: playback.episode_id.clone(),
                episode_number: playback.episode.number,
                audio_track: playback.server.audio_track,
                watched_at: Utc::now(),
            });
            self.history.save(&self.history_path)?;
        }
        Ok(())
    }
}

fn choose_action(has_servers: bool, failed: bool) -> Result<Option<Action>> {
    let mut actions = vec![
        (Action::Next, "Next episode"),
        (Action::Previous, "Previous episode"),
        (Action::Pick, "Pick an episode"),
    ];
    if has_servers {
        actions.push((Action::Server, "Switch server"));
    }
    if failed {
        actions.insert(0, (Action::Retry, "Retry"));
    }
    actions.push((Action::Quit, "Quit"));

    let labels: Vec<&str> = actions.iter().map(|(_, label)| *label).collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("What next? (Esc to quit)")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(selection.map(|idx| actions.swap_remove(idx).0))
}

fn choose_episode(
    episodes: &[types::Episode],
    current: Option<usize>,
) -> Result<Option<types::Episode>> {
    if episodes.is_empty() {
        println!("No episodes loaded yet.");
        return Ok(None);
    }
    let labels: Vec<String> = episodes.iter().map(types::Episode::label).collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Episode to play (Esc to cancel)")
        .items(&labels)
        .default(current.unwrap_or(0))
        .interact_opt()?;
    Ok(selection.map(|idx| episodes[idx].clone()))
}

fn choose_server(servers: &[ServerOption]) -> Result<Option<ServerOption>> {
    let ordered: Vec<&ServerOption> = group_servers(servers)
        .into_iter()
        .flat_map(|(_, group)| group)
        .collect();
    if ordered.is_empty() {
        println!("No servers loaded for this episode.");
        return Ok(None);
    }
    let labels: Vec<String> = ordered.iter().map(|s| s.label()).collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Server (Esc to cancel)")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(selection.map(|idx| ordered[idx].clone()))
}

async fn pick_from_listing<F, Fut>(fetch: F, start_page: u32) -> Result<Option<AnimeSummary>>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Listing, CatalogError>>,
{
    let mut page = start_page.max(1);
    loop {
        let listing = fetch(page).await?;
        if listing.items.is_empty() {
            println!("No results found.");
            return Ok(None);
        }

        let window: Vec<String> = page_window(listing.page, listing.total_pages)
            .into_iter()
            .map(|p| {
                if p == listing.page {
                    format!("[{p}]")
                } else {
                    p.to_string()
                }
            })
            .collect();
        let has_prev = listing.page > 1;
        let has_next = listing.page < listing.total_pages;

        let mut labels: Vec<String> = listing.items.iter().map(AnimeSummary::label).collect();
        if has_prev {
            labels.push(String::from("\u{2190} Previous page"));
        }
        if has_next {
            labels.push(String::from("Next page \u{2192}"));
        }

        let selection = Select::with_theme(&theme())
            .with_prompt(format!(
                "Page {} of {} ({}) \u{00b7} select a title (Esc to cancel)",
                listing.page,
                listing.total_pages,
                window.join(" ")
            ))
            .items(&labels)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            return Ok(None);
        };

        let count = listing.items.len();
        if idx < count {
            return Ok(listing.items.into_iter().nth(idx));
        }
        let navigating_back = has_prev && idx == count;
        page = if navigating_back {
            listing.page - 1
        } else {
            listing.page + 1
        };
    }
}

async fn pick_from_home(catalog: &Catalog<&ApiClient>) -> Result<Option<AnimeSummary>> {
    let feed = catalog.home().await?;
    let sections = [
        ("Trending", feed.trending),
        ("Popular", feed.most_popular),
        ("Airing", feed.top_airing),
        ("Latest", feed.latest_episodes),
    ];
    let entries: Vec<(&str, AnimeSummary)> = sections
        .into_iter()
        .flat_map(|(name, items)| items.into_iter().map(move |item| (name, item)))
        .collect();
    if entries.is_empty() {
        println!("Nothing on the home page right now.");
        return Ok(None);
    }

    let labels: Vec<String> = entries
        .iter()
        .map(|(section, item)| format!("[{section}] {}", item.label()))
        .collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Select a title (Esc to cancel)")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(selection.map(|idx| entries[idx].1.clone()))
}
