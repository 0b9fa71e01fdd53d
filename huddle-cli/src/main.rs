mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use console::{ConsoleSink, UiEvent};
use dialoguer::Confirm;
use huddle_client::{
    CallController, CallHandle, CallPhase, ClientConfig, RelayClient, SilenceCapture,
    WebRtcConnectionFactory,
};
use huddle_core::{CallKind, IceServerConfig};
use huddle_relay::RelayService;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Voice channels and direct calls over a huddle relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ClientArgs {
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    relay: String,

    #[arg(short, long)]
    user: String,

    /// JSON client configuration; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replaces the configured ICE servers. Repeatable.
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        listen: String,
    },
    /// Join a voice channel.
    Join {
        #[command(flatten)]
        client: ClientArgs,

        #[arg(short, long)]
        channel: String,
    },
    /// Call a user directly.
    Call {
        #[command(flatten)]
        client: ClientArgs,

        #[arg(long)]
        to: String,

        #[arg(long)]
        video: bool,
    },
    /// Wait for one incoming call.
    Wait {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { listen } => {
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("Failed to bind {}", listen))?;
            println!("{}", "🚀 Relay is up".green().bold());
            huddle_relay::serve(listener, RelayService::new()).await?;
        }
        Commands::Join { client, channel } => {
            let (handle, ui_rx) = start_client(&client).await?;
            println!("🎧 Joining {}", channel.bold());
            handle.join_voice(channel).await?;
            run_call(handle, ui_rx).await?;
        }
        Commands::Call { client, to, video } => {
            let (handle, ui_rx) = start_client(&client).await?;
            let kind = if video { CallKind::Video } else { CallKind::Audio };
            println!("📞 Calling {}", to.bold());
            handle.initiate_call(to, kind).await?;
            run_call(handle, ui_rx).await?;
        }
        Commands::Wait { client } => {
            let (handle, ui_rx) = start_client(&client).await?;
            println!("⏳ Waiting for a call as {}", client.user.bold());
            run_call(handle, ui_rx).await?;
        }
    }

    Ok(())
}

fn load_config(args: &ClientArgs) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ClientConfig::from_json(&text)
                .with_context(|| format!("Invalid config in {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if !args.ice_servers.is_empty() {
        config.transport.ice_servers = vec![IceServerConfig {
            urls: args.ice_servers.clone(),
            username: None,
            credential: None,
        }];
    }
    Ok(config)
}

async fn start_client(args: &ClientArgs) -> Result<(CallHandle, mpsc::UnboundedReceiver<UiEvent>)> {
    let config = load_config(args)?;
    let (client, link) = RelayClient::new(&args.relay, &args.user, config.relay.clone());
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let handle = CallController::spawn(
        config.clone(),
        Arc::new(client),
        Arc::new(ConsoleSink::new(ui_tx)),
        Arc::new(SilenceCapture),
        Arc::new(WebRtcConnectionFactory::new(config.transport.clone())),
    );

    info!("Connecting to {}", link.url());
    tokio::spawn(link.run(handle.clone()));
    wait_online(&handle).await?;
    Ok((handle, ui_rx))
}

async fn wait_online(handle: &CallHandle) -> Result<()> {
    let online = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if handle.snapshot().await?.relay_online {
                return Ok::<_, anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;

    match online {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Relay did not answer within 10 seconds"),
    }
}

/// Drives one call until it ends, the user quits or Ctrl-C.
async fn run_call(handle: CallHandle, mut ui_rx: mpsc::UnboundedReceiver<UiEvent>) -> Result<()> {
    let mut keys: Option<mpsc::UnboundedReceiver<char>> = None;
    let mut was_active = false;

    loop {
        tokio::select! {
            Some(event) = ui_rx.recv() => match event {
                UiEvent::Phase(CallPhase::Idle) => {
                    if was_active {
                        break;
                    }
                }
                UiEvent::Phase(phase) => {
                    was_active = true;
                    if phase == CallPhase::Connected && keys.is_none() {
                        print_keys();
                        keys = Some(spawn_key_reader());
                    }
                }
                UiEvent::Incoming(caller, kind) => {
                    let prompt = format!("{} is calling ({:?}). Answer?", caller.user, kind);
                    let answer = tokio::task::spawn_blocking(move || {
                        Confirm::new().with_prompt(prompt).default(true).interact()
                    })
                    .await??;

                    if answer {
                        handle.accept_call().await?;
                    } else {
                        handle.reject_call().await?;
                    }
                }
            },

            Some(key) = next_key(&mut keys) => {
                if !handle_key(key, &handle).await? {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!();
                handle.leave().await?;
                break;
            }
        }
    }

    println!("{}", "👋 Bye".cyan());
    Ok(())
}

async fn next_key(keys: &mut Option<mpsc::UnboundedReceiver<char>>) -> Option<char> {
    match keys {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Stdin is only read once a call is up, so it never competes with the
/// answer prompt.
fn spawn_key_reader() -> mpsc::UnboundedReceiver<char> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(key) = line.trim().chars().next() else {
                continue;
            };
            if tx.send(key).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_keys() {
    println!(
        "{}",
        "[m] mute  [d] deafen  [v] video  [s] screen  [q] leave".dimmed()
    );
}

/// Returns false when the user asked to leave.
async fn handle_key(key: char, handle: &CallHandle) -> Result<bool> {
    match key {
        'm' => handle.toggle_audio().await?,
        'd' => {
            let deafened = handle.snapshot().await?.media.deafened;
            handle.set_deafened(!deafened).await?;
        }
        'v' => handle.toggle_video().await?,
        's' => handle.toggle_screen_share().await?,
        'q' => {
            handle.leave().await?;
            return Ok(false);
        }
        other => {
            warn!("Unknown key {:?}", other);
            print_keys();
        }
    }
    Ok(true)
}
