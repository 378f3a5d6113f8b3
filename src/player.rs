use anyhow::{Context, Result, anyhow, bail};
use tokio::process::Command;
use tracing::debug;

use crate::config::PlayerSettings;
use crate::types::StreamTarget;

/// Arguments for an mpv-compatible player: fixed flags, the configured
/// extras, every subtitle track, then the stream URL.
pub fn player_args(stream: &StreamTarget, media_title: &str, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        String::from("--quiet"),
        String::from("--terminal=no"),
        format!("--force-media-title={media_title}"),
    ];
    args.extend(extra.iter().cloned());
    for track in stream.subtitle_tracks() {
        args.push(format!("--sub-file={}", track.file_url));
    }
    args.push(stream.video_url().to_string());
    args
}

pub async fn launch_player(
    settings: &PlayerSettings,
    stream: &StreamTarget,
    media_title: &str,
) -> Result<()> {
    let player = settings.command.trim();
    let args = player_args(stream, media_title, &settings.split_args()?);
    debug!(player, ?args, "launching player");

    let status = match Command::new(player).args(&args).status().await {
        Ok(status) => status,
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(anyhow!(
                    "Player '{player}' not found. Install mpv or set player.command (ANISTREAM_PLAYER__COMMAND)."
                ));
            }
            return Err(anyhow!(err).context(format!("failed to launch player '{player}'")));
        }
    };

    if !status.success() {
        bail!("player exited with status {status}");
    }
    Ok(())
}

/// Hands the stream URL to the system's default opener.
pub fn open_externally(stream: &StreamTarget) -> Result<()> {
    open::that(stream.video_url())
        .with_context(|| format!("failed to open {}", stream.video_url()))
}
