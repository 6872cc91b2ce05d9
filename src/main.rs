use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_bridge::audio::FileCapture;
use voice_bridge::session::{SessionEvent, SessionOverrides};
use voice_bridge::{BridgeClient, Config};

/// Voice bridge - credential guard and query client for Houndify
#[derive(Parser)]
#[command(name = "voice-bridge", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the credential guard HTTP server (the default)
    Serve,
    /// Send a one-shot text query through a running guard
    Ask {
        /// Query text
        query: String,
        /// Guard base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
    },
    /// Stream a WAV file as a voice query through a running guard
    Listen {
        /// Path to a 16-bit mono PCM WAV file (any sample rate)
        file: PathBuf,
        /// Guard base URL
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // RUST_LOG wins; otherwise map verbosity flags
    let fallback = match cli.verbose {
        0 => "info,voice_bridge=info",
        1 => "info,voice_bridge=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
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
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Ask { query, server } => ask(&server, &query).await,
        Command::Listen { file, server } => listen(&server, &file).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    // Refuses to start when the Houndify credentials are missing.
    let config = Config::load()?;
    voice_bridge::http::serve(config).await?;
    Ok(())
}

async fn ask(server: &str, query: &str) -> anyhow::Result<()> {
    let client = BridgeClient::connect(server).await?;
    let response = client.text_query(query).await?;
    println!("{}", response.summary());
    Ok(())
}

async fn listen(server: &str, file: &Path) -> anyhow::Result<()> {
    let client = BridgeClient::connect(server).await?;
    let capture = FileCapture::new(file);
    // The request info has to advertise the file's real rate or the
    // service misreads the PCM.
    let overrides = SessionOverrides {
        sample_rate: Some(capture.sample_rate()?),
        ..SessionOverrides::default()
    };
    let (handle, mut events) = client.start_voice(Box::new(capture), overrides).await?;

    let mut saw_partial = false;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::PartialTranscript(text) => {
                saw_partial = true;
                print!("\r{text}");
                std::io::stdout().flush()?;
            }
            SessionEvent::StateChanged(state) => tracing::debug!("session state: {state}"),
            SessionEvent::Response(_) | SessionEvent::Failed(_) => {}
        }
    }
    if saw_partial {
        println!();
    }

    let outcome = handle.outcome().await;
    println!("{}", outcome.user_message());
    Ok(())
}
