//! Process restart after a fatal coordinator outcome.
//!
//! The buffer lives only in memory, so whatever the emergency flush could
//! not deliver is lost here.

use std::process::Command;
use std::time::Duration;
use tracing::{error, warn};

use crate::coordinator::FatalReason;
use crate::error::AppResult;

/// Exit status asking a supervisor to start the process again
/// (`EX_TEMPFAIL`).
pub const EXIT_RESTART: i32 = 75;

/// Command that starts this executable again with the same arguments.
pub fn restart_command() -> AppResult<Command> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.args(std::env::args_os().skip(1));
    Ok(command)
}

/// Wait `delay`, then replace the process image with a fresh copy.
///
/// Falls back to exiting with [`EXIT_RESTART`] when re-exec is not
/// available or fails.
pub async fn restart(reason: FatalReason, delay: Duration) -> ! {
    error!(%reason, delay_ms = delay.as_millis() as u64, "restarting");
    tokio::time::sleep(delay).await;

    match restart_command() {
        Ok(command) => reexec(command),
        Err(e) => warn!(error = %e, "cannot build restart command"),
    }
    std::process::exit(EXIT_RESTART)
}

#[cfg(unix)]
fn reexec(mut command: Command) {
    use std::os::unix::process::CommandExt;

    // Only returns on failure.
    let err = command.exec();
    warn!(error = %err, "re-exec failed");
}

#[cfg(not(unix))]
fn reexec(_command: Command) {
    warn!("re-exec unsupported on this platform, leaving restart to the supervisor");
}
