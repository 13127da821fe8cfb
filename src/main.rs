use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voice_companion::voice::console::{ConsoleRecognizer, ConsoleSynthesizer, LogNotifications};
use voice_companion::voice::TranscriptionService;
use voice_companion::{
    AppState, Assistant, AssistantConfig, Backends, Collaborators, ConversationEvent,
    HttpBackend, LogAlerts,
};

/// Companion - voice assistant core driven from the terminal
#[derive(Parser)]
#[command(name = "companion", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Assistant name, overriding config
    #[arg(short, long)]
    name: Option<String>,

    /// Assistant REST API base URL; runs offline when unset
    #[arg(long, env = "COMPANION_API_URL")]
    api_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe a recorded audio file
    Transcribe {
        /// Path to the audio file
        path: PathBuf,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_companion=info",
        1 => "info,voice_companion=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AssistantConfig::load(cli.config.as_deref())?;
    if let Some(name) = cli.name {
        config.assistant_name = name;
    }
    if cli.api_url.is_some() {
        config.api.base_url = cli.api_url;
    }
    config.validate()?;

    let http = match &config.api.base_url {
        Some(url) => Some(Arc::new(HttpBackend::new(
            url.clone(),
            config.api.api_key.clone(),
        )?)),
        None => None,
    };

    match cli.command {
        Some(Command::ShowConfig) => {
            let mut shown = config;
            if shown.api.api_key.is_some() {
                shown.api.api_key = Some("<redacted>".to_string());
            }
            println!("{shown:#?}");
            Ok(())
        }
        Some(Command::Transcribe { path }) => transcribe(config, http, &path).await,
        None => run_console(config, http).await,
    }
}

fn collaborators(
    config: &AssistantConfig,
    recognizer: Arc<ConsoleRecognizer>,
    http: Option<Arc<HttpBackend>>,
) -> Collaborators {
    let (backends, transcriber) = match http {
        Some(http) => (
            Backends::shared(Arc::clone(&http)),
            Some(http as Arc<dyn TranscriptionService>),
        ),
        None => (Backends::offline(), None),
    };

    Collaborators {
        recognizer,
        synthesizer: Arc::new(ConsoleSynthesizer::new(config.assistant_name.clone())),
        transcriber,
        notifications: Arc::new(LogNotifications),
        alerts: Arc::new(LogAlerts),
        preferences: Assistant::default_preferences(config),
        backends,
    }
}

async fn transcribe(
    config: AssistantConfig,
    http: Option<Arc<HttpBackend>>,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    let recognizer = Arc::new(ConsoleRecognizer::new());
    let collaborators = collaborators(&config, recognizer, http);
    let assistant = Assistant::new(config, collaborators);

    match assistant.speech().transcribe_audio_file(path).await {
        Some(result) => {
            println!("{} (confidence {:.2})", result.text, result.confidence);
            Ok(())
        }
        None => anyhow::bail!("audio file not found: {}", path.display()),
    }
}

async fn run_console(config: AssistantConfig, http: Option<Arc<HttpBackend>>) -> anyhow::Result<()> {
    tracing::info!(
        assistant = %config.assistant_name,
        online = http.is_some(),
        "starting voice companion"
    );

    let recognizer = Arc::new(ConsoleRecognizer::new());
    let collaborators = collaborators(&config, Arc::clone(&recognizer), http);
    let assistant = Assistant::new(config, collaborators);
    assistant.setup().await?;

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(()).await;
        }
    });

    let mut events = assistant.conversation().events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ConversationEvent::Ended(summary) = event {
                println!("{summary}");
            }
        }
    });

    let runner = assistant.clone();
    let run_loop = tokio::spawn(async move { runner.run(&mut shutdown_rx).await });

    if !assistant.enable().await {
        tracing::warn!("wake word listening is not running");
    }
    println!(
        "Type what you would say. Commands: /cancel /background /foreground /quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            "/cancel" => {
                if !assistant.conversation().cancel_conversation().await {
                    println!("No conversation to cancel");
                }
            }
            "/background" => assistant.handle_app_state(AppState::Background).await,
            "/foreground" => assistant.handle_app_state(AppState::Foreground).await,
            text => {
                if !recognizer.hear(text) {
                    println!("(not listening right now)");
                }
            }
        }
    }

    let _ = shutdown_tx.send(()).await;
    run_loop.await?;
    tracing::info!("voice companion stopped");
    Ok(())
}
