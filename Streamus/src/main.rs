use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use stmconfig::Config;
use stmplaylist::{
    EntityId, Playlist, PlaylistConfigExt, PlaylistEvent, PlaylistEventKind, Video,
};
use stmrelay::{
    ChannelFrameSource, FrameRelay, HttpFallbackLoader, ImageSurface, PlayerState, RelayEvent,
    RelayInput, RelayMode,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

mod logs;

#[derive(Debug, Parser)]
#[command(name = "streamus", version, about = "Streamus playlist client")]
struct Cli {
    /// Configuration directory (defaults to ~/.streamus or $STREAMUS_CONFIG)
    #[arg(long, global = true, default_value = "")]
    config_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a playlist and its share link
    Show { playlist: EntityId },
    /// Add a video to a playlist
    Add {
        playlist: EntityId,
        video_id: String,
        title: String,
        /// Duration in seconds
        duration: u64,
        #[arg(long)]
        author: Option<String>,
        /// Insert at this position instead of appending
        #[arg(long)]
        index: Option<usize>,
    },
    /// Move an item to a new position
    Move {
        playlist: EntityId,
        item: EntityId,
        index: usize,
    },
    /// Remove an item
    Remove { playlist: EntityId, item: EntityId },
    /// Rename a playlist, waiting for the debounced write to land
    Rename { playlist: EntityId, title: String },
    /// Render the paused-at-start still of a video into a PNG file
    Still {
        video_id: String,
        #[arg(long, default_value = "still.png")]
        out: PathBuf,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
    },
    /// Print the effective configuration values
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(&cli.config_dir).or_else(|e| {
        eprintln!("Cannot load configuration ({}), using defaults", e);
        Config::in_memory()
    })?;
    logs::init_logging(&config);

    info!(server = %config.server_url(), "Streamus starting");

    match cli.command {
        Command::Config => print_config(&config),
        Command::Still {
            video_id,
            out,
            width,
            height,
        } => render_still(video_id, out, width, height).await,
        command => run_playlist_command(&config, command).await,
    }
}

async fn run_playlist_command(config: &Config, command: Command) -> Result<()> {
    let gateway = Arc::new(config.http_gateway()?);
    let settings = config.sync_settings()?;

    match command {
        Command::Config | Command::Still { .. } => {}
        Command::Show { playlist } => {
            let playlist = Playlist::fetch(playlist, gateway, settings).await?;
            print_playlist(&playlist);
            let code = playlist.share_code().await?;
            println!("Share: {}", code.url(&config.server_url()));
        }
        Command::Add {
            playlist,
            video_id,
            title,
            duration,
            author,
            index,
        } => {
            let mut playlist = Playlist::fetch(playlist, gateway, settings).await?;
            let mut video = Video::new(video_id, title, duration);
            if let Some(author) = author {
                video = video.with_author(author);
            }
            let video = Arc::new(video);
            let item = match index {
                Some(index) => playlist.add_item_at_index(video, index).await?,
                None => playlist.add_item(video).await?,
            };
            info!(sequence = item.sequence, "Item added");
            print_playlist(&playlist);
        }
        Command::Move {
            playlist,
            item,
            index,
        } => {
            let mut playlist = Playlist::fetch(playlist, gateway, settings).await?;
            let sequence = playlist.move_item_to_index(item, index).await?;
            info!(%item, sequence, "Item moved");
            print_playlist(&playlist);
        }
        Command::Remove { playlist, item } => {
            let mut playlist = Playlist::fetch(playlist, gateway, settings).await?;
            let removed = playlist.remove_item(item).await?;
            info!(title = %removed.title, "Item removed");
            print_playlist(&playlist);
        }
        Command::Rename { playlist, title } => {
            let quiet_period = settings.quiet_period;
            let mut playlist = Playlist::fetch(playlist, gateway, settings).await?;
            let mut events = playlist.subscribe();
            playlist.set_title(title);
            wait_for_title_write(&mut events, quiet_period).await?;
            println!("Renamed to \"{}\"", playlist.title());
        }
    }
    Ok(())
}

async fn wait_for_title_write(
    events: &mut broadcast::Receiver<PlaylistEvent>,
    quiet_period: Duration,
) -> Result<()> {
    let deadline = quiet_period + Duration::from_secs(30);
    tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(PlaylistEvent {
                    kind: PlaylistEventKind::Synced { field: Some(field) },
                    ..
                }) if field == "title" => return Ok(()),
                Ok(PlaylistEvent {
                    kind: PlaylistEventKind::Failed { operation, error },
                    ..
                }) => return Err(anyhow!("{} failed: {}", operation, error)),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("playlist dropped before the title was saved"))
                }
            }
        }
    })
    .await
    .context("timed out waiting for the title to be saved")?
}

fn print_playlist(playlist: &Playlist) {
    println!("{} ({})", playlist.title(), playlist.display_info());
    for (index, item) in playlist.items().iter().enumerate() {
        let id = item
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}. {} [{}s] {} seq={}",
            index + 1,
            item.title,
            item.duration(),
            id,
            item.sequence
        );
    }
}

fn print_config(config: &Config) -> Result<()> {
    println!("server_url: {}", config.server_url());
    println!("title_debounce_ms: {}", config.get_title_debounce_ms()?);
    println!("request_timeout_secs: {}", config.get_request_timeout_secs()?);
    println!("request_max_retries: {}", config.get_request_max_retries()?);
    println!("suggested_quality: {}", config.suggested_quality());
    println!("log_min_level: {}", config.get_log_min_level());
    if let Some(dir) = config.directory() {
        println!("directory: {}", dir.display());
    }
    Ok(())
}

/// Drives a relay through "loaded, paused at 0s" and saves what it drew
async fn render_still(video_id: String, out: PathBuf, width: u32, height: u32) -> Result<()> {
    // No live source here: only the fallback still or the blank can be drawn
    let (source, _feed) = ChannelFrameSource::new();
    let relay = FrameRelay::new(ImageSurface::new(width, height), Arc::new(source))
        .with_fallback_loader(Arc::new(HttpFallbackLoader::new()));
    let mut events = relay.subscribe();

    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(relay.run(rx));

    tx.send(RelayInput::ContentLoaded { video_id }).await?;
    tx.send(RelayInput::PlayerStateChanged {
        state: PlayerState::Paused,
        elapsed_secs: 0.0,
    })
    .await?;

    loop {
        match events.recv().await {
            Ok(RelayEvent::FallbackDrawn) => break,
            Ok(RelayEvent::ModeChanged(RelayMode::PausedNoFrame)) => {
                warn!("No still available, saving a blank surface");
                break;
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    drop(tx);
    let relay = task.await?;
    relay
        .into_surface()
        .into_image()
        .save(&out)
        .with_context(|| format!("cannot write {}", out.display()))?;
    println!("Saved {}", out.display());
    Ok(())
}
