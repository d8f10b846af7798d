//! Terminal chat for moodcam.

use clap::Parser;
use moodcam::camera::{CameraStatus, Permission};
use moodcam::config::CameraSourceKind;
use moodcam::session::export::{HistoryFormat, Locale};
use moodcam::{ChatConfig, Conversation, MessageId, SendOutcome};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// moodcam: chat with an assistant that can see how you feel.
#[derive(Parser)]
#[command(name = "moodcam", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use a still image file as the camera.
    #[arg(long, conflicts_with = "snapshot_url")]
    camera_file: Option<PathBuf>,

    /// Use an HTTP snapshot endpoint (IP camera) as the camera.
    #[arg(long)]
    snapshot_url: Option<String>,

    /// Language for exported history labels (en, es, fr, de).
    #[arg(long)]
    locale: Option<Locale>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the transcript, logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("moodcam=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    run_chat(config).await
}

fn load_config(cli: &Cli) -> anyhow::Result<ChatConfig> {
    let mut config = match &cli.config {
        Some(path) => ChatConfig::from_file(path)?,
        None => {
            let path = ChatConfig::default_config_path();
            if path.exists() {
                info!(path = %path.display(), "loading config");
                ChatConfig::from_file(&path)?
            } else {
                ChatConfig::default()
            }
        }
    };

    if let Some(key) = &cli.api_key {
        config.gateway.api_key = Some(key.clone());
    }
    if let Some(path) = &cli.camera_file {
        config.camera.source = CameraSourceKind::File;
        config.camera.file_path = Some(path.clone());
    }
    if let Some(url) = &cli.snapshot_url {
        config.camera.source = CameraSourceKind::Snapshot;
        config.camera.snapshot_url = Some(url.clone());
    }
    if let Some(locale) = cli.locale {
        config.session.locale = locale;
    }
    Ok(config)
}

async fn run_chat(config: ChatConfig) -> anyhow::Result<()> {
    println!("moodcam v{}", env!("CARGO_PKG_VERSION"));
    println!("Commands: /camera /status /key <key> /save [json|text] /quit\n");

    let conversation = Conversation::from_config(&config);
    let mut last_seen = print_new(&conversation, None);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                None
            }
        };
        let Some(line) = line else { break };

        match parse_command(&line) {
            Some(Command::Quit) => break,
            Some(Command::Camera) => {
                let switched = conversation.toggle_camera().await;
                println!("{}", describe_toggle(switched, conversation.camera_status()));
            }
            Some(Command::Status) => {
                let status = conversation.camera_status();
                println!(
                    "camera: {} (permission {}), api key: {}",
                    if status.is_active { "on" } else { "off" },
                    status.permission,
                    if conversation.has_credential() { "set" } else { "missing" },
                );
            }
            Some(Command::Key(key)) => {
                if conversation.set_credential(&key) {
                    println!("API key updated");
                } else {
                    println!("usage: /key <your-key>");
                }
            }
            Some(Command::Save(format)) => save(&conversation, format),
            Some(Command::Unknown(cmd)) => println!("unknown command: {cmd}"),
            None => {
                conversation.set_input(&line);
                match conversation.submit().await {
                    SendOutcome::Skipped(reason) => info!(?reason, "message not sent"),
                    SendOutcome::Failed(e) => warn!(error = %e, "send failed"),
                    SendOutcome::Completed { emotion, reply } => {
                        if let Some(emotion) = emotion {
                            println!("(you look {})", emotion.value());
                        }
                        if reply.degradation().is_some_and(|d| d.is_credential_problem()) {
                            println!("(the API key is missing or was rejected; set one with /key <your-key>)");
                        }
                    }
                }
            }
        }
        last_seen = print_new(&conversation, last_seen);
    }

    Ok(())
}

fn describe_toggle(switched: bool, status: CameraStatus) -> String {
    match (switched, status.is_active) {
        (_, true) => "camera on".to_owned(),
        (true, false) => "camera off".to_owned(),
        (false, false) => format!("camera unavailable (permission {})", status.permission),
    }
}

fn save(conversation: &Conversation, format: Option<HistoryFormat>) {
    let dir = conversation.default_export_dir();
    let result = match format {
        Some(format) => conversation.download_history_as(&dir, format),
        None => conversation.download_history(&dir),
    };
    match result {
        Ok(path) => println!("history saved to {}", path.display()),
        Err(e) => println!("could not save history: {e}"),
    }
}

/// Print assistant messages appended since `last_seen`.
fn print_new(conversation: &Conversation, last_seen: Option<MessageId>) -> Option<MessageId> {
    let messages = conversation.messages();
    for message in messages.iter().filter(|m| Some(m.id) > last_seen) {
        if !message.is_user {
            println!("assistant> {}\n", message.text_or_empty());
        }
    }
    messages.last().map(|m| m.id).or(last_seen)
}

#[derive(Debug, PartialEq)]
enum Command {
    Camera,
    Status,
    Key(String),
    Save(Option<HistoryFormat>),
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();
    Some(match name {
        "camera" => Command::Camera,
        "status" => Command::Status,
        "key" => Command::Key(arg.to_owned()),
        "save" => match arg {
            "" => Command::Save(None),
            other => match other.parse() {
                Ok(format) => Command::Save(Some(format)),
                Err(_) => Command::Unknown(line.to_owned()),
            },
        },
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_owned()),
    })
}
