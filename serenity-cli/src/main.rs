//! serenity-cli — account, mood history and one-shot chat for the Serenity backend
//!
//! # Subcommands
//! - `signup --name <n> --email <e> --password <p>` — create an account
//! - `login --email <e> --password <p>`             — password login
//! - `google-login <token>`                          — Google ID token login
//! - `mood [--json] [--watch <secs>]`                — mood history chart and average
//! - `chat <text> [--emotion <label>]`               — single chat exchange

use clap::{Parser, Subcommand};
use serenity_core::config::BackendConfig;
use serenity_core::models::{
    AuthResponse, GoogleLoginRequest, LoginRequest, MoodPoint, MoodSummary, SignupRequest,
};
use serenity_core::{Expression, HttpBackend};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const BAR_WIDTH: usize = 40;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "serenity-cli",
    version,
    about = "Serenity account, mood history and chat CLI"
)]
struct Cli {
    /// Backend base URL (overrides SERENITY_BACKEND_URL env var)
    #[arg(long, env = "SERENITY_BACKEND_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 15_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Log in with a Google ID token
    GoogleLogin {
        /// ID token issued by Google Sign-In
        token: String,
    },

    /// Show recent mood history
    Mood {
        /// Output raw points as JSON
        #[arg(long)]
        json: bool,

        /// Re-fetch every SECS seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Send one chat message and print the reply
    Chat {
        text: String,

        /// Emotion label to attach (neutral, happy, sad, angry, fearful, disgusted, surprised)
        #[arg(long)]
        emotion: Option<Expression>,
    },
}

// ============================================================================
// Output formatting
// ============================================================================

/// One line for a successful auth call.
pub fn auth_outcome(action: &str, resp: &AuthResponse) -> String {
    match (&resp.user, &resp.message) {
        (Some(user), _) => format!("{action}: welcome, {user}"),
        (None, Some(message)) => format!("{action}: {message}"),
        (None, None) => format!("{action}: ok"),
    }
}

/// Text chart of mood history, oldest first, followed by the 0-10 average.
pub fn render_mood(points: &[MoodPoint]) -> String {
    let summary = MoodSummary::from_points(points);
    let Some(average) = summary.average else {
        return "No mood history yet.".to_string();
    };

    let mut out = String::new();
    for (point, height) in points.iter().zip(&summary.bars) {
        let filled = ((height / 100.0) * BAR_WIDTH as f32).round() as usize;
        out.push_str(&format!(
            "{}  {:<width$}  {:+.2}\n",
            point.timestamp.format("%m-%d %H:%M"),
            "#".repeat(filled),
            point.score,
            width = BAR_WIDTH
        ));
    }
    out.push_str(&format!("Average mood: {average:.1}/10"));
    out
}

/// Chart or JSON rendering of one mood-history fetch.
pub fn mood_report(points: &[MoodPoint], json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(points)?)
    } else {
        Ok(render_mood(points))
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Poll mood history until ctrl-c. Fetch failures are reported and the next
/// tick tries again.
async fn watch_mood(backend: &HttpBackend, json: bool, period: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {}
        }
        match backend.mood_history().await {
            Ok(points) => println!("{}\n", mood_report(&points, json)?),
            Err(e) => eprintln!("serenity-cli: mood history unavailable: {e}"),
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = BackendConfig::new(cli.server.trim_end_matches('/'));
    config.request_timeout_ms = cli.timeout_ms;
    let backend = HttpBackend::new(&config)?;

    match cli.command {
        Commands::Signup {
            name,
            email,
            password,
        } => {
            let resp = backend
                .signup(&SignupRequest {
                    full_name: name,
                    email,
                    password,
                })
                .await?;
            println!("{}", auth_outcome("signup", &resp));
        }
        Commands::Login { email, password } => {
            let resp = backend.login(&LoginRequest { email, password }).await?;
            println!("{}", auth_outcome("login", &resp));
        }
        Commands::GoogleLogin { token } => {
            let resp = backend.google_login(&GoogleLoginRequest { token }).await?;
            println!("{}", auth_outcome("google-login", &resp));
        }
        Commands::Mood { json, watch: None } => {
            let points = backend.mood_history().await?;
            println!("{}", mood_report(&points, json)?);
        }
        Commands::Mood {
            json,
            watch: Some(secs),
        } => {
            watch_mood(&backend, json, Duration::from_secs(secs.max(1))).await?;
        }
        Commands::Chat { text, emotion } => {
            if text.trim().is_empty() {
                anyhow::bail!("message must not be empty");
            }
            let reply = backend.chat(&text, emotion).await?;
            println!("{reply}");
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("serenity-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
