use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sketchforge::prelude::*;
use tracing_subscriber::EnvFilter;

/// Real-time drawing-and-guessing game coordinator.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on for WebSocket clients
    #[arg(long, env = "SKETCH_BIND", default_value = "0.0.0.0:3001")]
    bind: String,

    /// Players needed to start and to keep a game going
    #[arg(long)]
    min_players: Option<usize>,

    /// Roster cap per room
    #[arg(long)]
    max_players: Option<usize>,

    /// Rounds per game
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Length of one drawing round in seconds
    #[arg(long)]
    round_secs: Option<u64>,

    /// Seconds a disconnected player keeps their seat
    #[arg(long)]
    grace_secs: Option<u64>,

    /// Signup window of a public room in seconds
    #[arg(long)]
    enrollment_secs: Option<u64>,

    /// How each round's drawer is chosen
    #[arg(long, value_enum, default_value_t = DrawerPolicyArg::Rotate)]
    drawer_policy: DrawerPolicyArg,

    /// Points taken from the drawer when nobody guesses the word
    #[arg(long)]
    timeout_penalty: Option<u32>,

    /// Newline-separated word list replacing the built-in one
    #[arg(long, value_name = "FILE")]
    words: Option<PathBuf>,

    /// Open a public game daily at this UTC time (repeatable)
    #[arg(long = "public-at", value_name = "HH:MM")]
    public_at: Vec<TimeOfDay>,

    /// Executable run as `<hook> <room_id> <winner>` after each game
    #[arg(long, value_name = "PATH")]
    winner_hook: Option<PathBuf>,

    /// Drop connections silent for this many seconds
    #[arg(long, default_value_t = 30)]
    idle_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DrawerPolicyArg {
    Rotate,
    Random,
}

impl From<DrawerPolicyArg> for DrawerPolicy {
    fn from(arg: DrawerPolicyArg) -> Self {
        match arg {
            DrawerPolicyArg::Rotate => DrawerPolicy::Rotate,
            DrawerPolicyArg::Random => DrawerPolicy::Random,
        }
    }
}

impl Args {
    fn game_config(&self) -> GameConfig {
        let mut config = GameConfig {
            drawer_policy: self.drawer_policy.into(),
            ..GameConfig::default()
        };
        if let Some(n) = self.min_players {
            config.min_players = n;
        }
        if let Some(n) = self.max_players {
            config.max_players = n;
        }
        if let Some(n) = self.max_rounds {
            config.max_rounds = n;
        }
        if let Some(secs) = self.round_secs {
            config.round_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = self.grace_secs {
            config.reconnect_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = self.enrollment_secs {
            config.enrollment_window = Duration::from_secs(secs);
        }
        if let Some(points) = self.timeout_penalty {
            config.timeout_penalty = points;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.game_config();

    let mut builder = SketchServer::builder()
        .bind(&args.bind)
        .timetable(args.public_at.clone())
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs));

    if let Some(path) = &args.words {
        let words = WordBank::from_file(path, config.used_word_fraction)
            .map_err(SketchError::from)?;
        tracing::info!(
            path = %path.display(),
            words = words.len(),
            "word list loaded"
        );
        builder = builder.words(words);
    }
    if let Some(hook) = &args.winner_hook {
        builder =
            builder.winner_reporter(WinnerReporter::Command(hook.clone()));
    }

    let server = builder.game_config(config).build(OpaqueIdentity).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");
    server.run().await?;
    Ok(())
}
