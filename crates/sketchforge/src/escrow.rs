//! Hand-off of finished games to the escrow layer.
//!
//! Paying out the winner happens outside the coordinator. All the server
//! does is tell something else who won; it never waits for the answer.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use sketchforge_protocol::{PlayerId, RoomId, ScoreEntry};
use tokio::process::Command;

/// Where game winners are reported.
#[derive(Debug, Clone, Default)]
pub enum WinnerReporter {
    /// Emit a structured log line and nothing else.
    #[default]
    Log,

    /// Run `<path> <room_id> <winner>` for every decided game.
    Command(PathBuf),
}

impl WinnerReporter {
    /// Reports a finished game. Returns immediately; a hook runs on its
    /// own task and only its failure is logged.
    pub fn report(
        &self,
        room_id: RoomId,
        winner: PlayerId,
        scores: &[ScoreEntry],
    ) {
        let top_score = scores
            .iter()
            .find(|e| e.player == winner)
            .map_or(0, |e| e.score);
        tracing::info!(
            %room_id,
            winner = %winner,
            score = top_score,
            players = scores.len(),
            "game winner declared"
        );

        if let Self::Command(path) = self {
            let path = path.clone();
            tokio::spawn(async move {
                match run_hook(&path, &room_id, &winner).await {
                    Ok(status) if status.success() => {
                        tracing::debug!(%room_id, "winner hook finished");
                    }
                    Ok(status) => {
                        tracing::warn!(
                            %room_id,
                            hook = %path.display(),
                            %status,
                            "winner hook exited with failure"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            %room_id,
                            hook = %path.display(),
                            error = %e,
                            "winner hook could not be started"
                        );
                    }
                }
            });
        }
    }
}

async fn run_hook(
    path: &Path,
    room_id: &RoomId,
    winner: &PlayerId,
) -> std::io::Result<ExitStatus> {
    Command::new(path)
        .arg(room_id.as_str())
        .arg(winner.as_str())
        .kill_on_drop(true)
        .status()
        .await
}
