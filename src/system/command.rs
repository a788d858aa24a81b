use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

pub const TIMEOUT_TEXT: &str = "Command timeout";

/// Runs `program` and returns its trimmed stdout.
///
/// Never fails: a timeout yields [`TIMEOUT_TEXT`] and a spawn failure yields
/// `"Error: <reason>"`, so a slow or missing tool only degrades one field of
/// a capture. The child is killed when the timeout fires.
pub async fn run_with_timeout(program: &str, args: &[&str], limit: Duration) -> String {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout).trim().to_string(),
        Ok(Err(err)) => {
            warn!(program, error = %err, "external command failed");
            format!("Error: {err}")
        }
        Err(_) => {
            warn!(program, timeout_ms = limit.as_millis() as u64, "external command timed out");
            TIMEOUT_TEXT.to_string()
        }
    }
}
