use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tandem_client::{
    api::RoomApi,
    config::ClientConfig,
    constants::VERSION,
    handlers::{EventKind, TransportEvent},
    headless::{HeadlessControls, HeadlessHost},
    identity::{IdentityStore, ParticipantIdentity},
    invite::parse_room_link,
    protocol::{MessageKind, ServerMessage},
    session::RoomSession,
};

const USAGE: &str = "usage: tandem <room-link-or-id> [--name NAME] [--video URL]";

struct Args {
    room: String,
    name: Option<String>,
    video: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut room = None;
    let mut name = None;
    let mut video = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--name" => name = Some(args.next().context("--name needs a value")?),
            "--video" => video = Some(args.next().context("--video needs a value")?),
            "-h" | "--help" => bail!(USAGE),
            _ if room.is_none() => room = Some(arg),
            other => bail!("unexpected argument {other}\n{USAGE}"),
        }
    }
    Ok(Args {
        room: room.context(USAGE)?,
        name,
        video,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_client=debug,info".into()),
        )
        .init();

    let args = parse_args()?;
    let config = ClientConfig::from_env();
    info!("tandem {VERSION}");

    let link = parse_room_link(&args.room)
        .with_context(|| format!("{} is not a room link or id", args.room))?;

    let store = IdentityStore::new(config.data_dir.as_deref());
    let identity = match args.name.or(link.username) {
        Some(name) => {
            let identity =
                ParticipantIdentity::new(&name).context("display name must not be blank")?;
            if let Err(e) = store.save(&identity) {
                warn!("Could not remember display name: {e:#}");
            }
            identity
        }
        None => store.load_or_create(),
    };

    let api = RoomApi::new(&config.api_url)?;
    match api.get_room(&link.room).await {
        Ok(room) => {
            info!(host = %room.host_username, "Joining room {}", room.id);
            if let Some(url) = room.video_url.filter(|url| !url.is_empty()) {
                info!("Room is showing {url}");
            }
        }
        Err(e) => warn!("Room lookup failed, joining anyway: {e:#}"),
    }

    let host = HeadlessHost::default();
    let controls = host.controls();
    let session = RoomSession::join(&config, link.room, identity.clone(), Arc::new(host))
        .await
        .context("Failed to join room")?;
    info!("Joined as {identity}");

    session.transport().subscribe(
        EventKind::Message(MessageKind::ChatMessage),
        |event: &TransportEvent| {
            if let TransportEvent::Message(ServerMessage::ChatMessage(entry)) = event {
                info!("<{}> {}", entry.username, entry.content);
            }
            Ok(())
        },
    );

    let mut participants = session.participants();
    tokio::spawn(async move {
        while participants.changed().await.is_ok() {
            let names = participants.borrow_and_update().join(", ");
            info!("In the room: {names}");
        }
    });

    let mut status = session.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!("Connection: {current:?}");
        }
    });

    if let Some(url) = args.video {
        session.change_video(&url, None)?;
    }

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match run_command(&session, &controls, &store, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => warn!("{e:#}"),
        }
    }

    session.leave().await;
    Ok(())
}

/// Returns false when the user asked to quit
async fn run_command(
    session: &RoomSession,
    controls: &HeadlessControls,
    store: &IdentityStore,
    line: &str,
) -> Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "" => {}
        "play" => controls.user_play()?,
        "pause" => controls.user_pause()?,
        "seek" => {
            let seconds: f64 = rest
                .parse()
                .with_context(|| format!("not a position: {rest:?}"))?;
            controls.user_seek(seconds)?;
        }
        "video" => session.change_video(rest, None)?,
        "name" => {
            let identity = ParticipantIdentity::new(rest).context("name must not be blank")?;
            session.rename(identity.clone())?;
            store.save(&identity)?;
        }
        "chat" => session.send_chat(rest)?,
        "reconnect" => session.reconnect().await?,
        "stats" => {
            let playback = session.playback().await?;
            let stats = session.transport().stats_snapshot();
            info!(
                playing = playback.is_playing,
                position = %format!("{:.1}", playback.current_time),
                source = playback.source.as_ref().map(|s| s.url.as_str()).unwrap_or("-"),
                "Playback"
            );
            info!(
                rtt_ms = ?stats.last_rtt_ms,
                messages_in = stats.messages_in,
                messages_out = stats.messages_out,
                disconnects = stats.disconnects,
                "Connection"
            );
        }
        "quit" | "exit" => return Ok(false),
        other => warn!("Unknown command {other}; try play, pause, seek, video, name, chat, reconnect, stats, quit"),
    }
    Ok(true)
}
