use clap::Parser;
use serenity_core::onnx_expression::{resolve_model_path, OnnxExpressionAdapter};
use serenity_core::{HttpBackend, Sender, SerenityConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use serenity_session::{DirectoryFrameSource, VideoSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Emotion-aware chat session over a replayed camera feed")]
struct Args {
    #[arg(short, long, default_value = "serenity.toml")]
    config: String,

    /// Directory of face images replayed as the camera feed
    #[arg(short, long)]
    frames: PathBuf,

    /// Expression model path (overrides [model] onnx_model_path)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Backend base URL (overrides [backend] base_url)
    #[arg(long, env = "SERENITY_BACKEND_URL")]
    backend_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let mut config = match SerenityConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }

    // Init logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let frames = Arc::new(DirectoryFrameSource::open(&args.frames)?);
    let model_path = args
        .model
        .unwrap_or_else(|| resolve_model_path(&config.model.onnx_model_path));
    let adapter = Arc::new(OnnxExpressionAdapter::new(model_path, config.model.input_size));

    let request_timeout = config.backend.exchange_timeout();

    let session = VideoSession::new(
        &config.service.greeting,
        &config.sampler,
        frames,
        adapter,
        backend,
        request_timeout,
    );

    for message in session.state().transcript() {
        println!("serenity> {}", message.text);
    }

    if let Err(e) = session.load_and_start().await {
        tracing::warn!(error = %e, "Continuing without emotion detection");
    }

    // Print replies as they land.
    let mut events = session.state().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(message) if message.sender == Sender::Assistant => {
                    println!("serenity> {}", message.text);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Transcript printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/emotion" => match session.state().latest_emotion() {
                        Some(s) => println!("[{} {:.0}%]", s.label, s.confidence * 100.0),
                        None => println!("[detecting...]"),
                    },
                    _ => {
                        session.submit(&line);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    session.teardown().await;
    printer.abort();
    Ok(())
}
