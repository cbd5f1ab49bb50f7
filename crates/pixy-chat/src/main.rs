use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;
use pixy_chat::{
    ChatClient, ChatSettings, Message, Outcome, StreamEvent, default_config_path,
    load_chat_settings,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pixy-chat", version, about = "one-shot streaming chat completion")]
struct Cli {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let log_dir = PathBuf::from(home).join(".pixy");
    if let Err(error) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "warning: failed to create log dir {}: {error}",
            log_dir.display()
        );
        return;
    }

    let appender = tracing_appender::rolling::never(&log_dir, "pixy-chat.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = TRACE_GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init();
}

fn resolve_settings(cli: &Cli) -> Result<ChatSettings, String> {
    let mut settings = match cli.config.as_ref() {
        Some(path) => load_chat_settings(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_chat_settings(&path)?
            } else {
                ChatSettings::default()
            }
        }
    };

    if let Some(base_url) = cli.base_url.as_ref() {
        settings.provider.base_url = base_url.clone();
    }
    if cli.debug {
        settings.client.debug = true;
    }
    Ok(settings)
}

async fn run(cli: Cli) -> Result<(), String> {
    let settings = resolve_settings(&cli)?;
    let model = cli
        .model
        .clone()
        .or(settings.model.clone())
        .ok_or_else(|| "no model given; pass --model or set chat.model in chat.toml".to_string())?;

    let mut messages = Vec::new();
    if let Some(system) = cli.system.as_ref() {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::user(cli.prompt.clone()));

    let mut client = ChatClient::openai_compatible(settings.provider, settings.client);
    let events = client.send(&messages, &model, &[]);

    let mut stdout = io::stdout();
    let mut errors = Vec::new();
    let mut outcome = Outcome::Failed;
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Content { text } => {
                print!("{text}");
                let _ = stdout.flush();
            }
            StreamEvent::Reasoning { .. } | StreamEvent::ToolPreparing { .. } => {}
            StreamEvent::ToolCall { call } => {
                if call.is_malformed() {
                    eprintln!("[tool call without a name: {}]", call.raw_arguments);
                } else {
                    eprintln!("[tool call {} {}({})]", call.id, call.name, call.arguments);
                }
            }
            StreamEvent::Usage { usage } => {
                eprintln!(
                    "[usage prompt={} completion={} cached={} total={}]",
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.cached_tokens,
                    usage.total_tokens()
                );
            }
            StreamEvent::Stop { reason } => {
                tracing::debug!(?reason, "stop reason");
            }
            StreamEvent::Error { message } => errors.push(message),
            StreamEvent::Done { outcome: done } => outcome = done,
        }
    }
    println!();

    match outcome {
        Outcome::Success => Ok(()),
        Outcome::Cancelled => Err("request cancelled".to_string()),
        Outcome::Failed if errors.is_empty() => Err("request failed".to_string()),
        Outcome::Failed => Err(errors.join("; ")),
    }
}
