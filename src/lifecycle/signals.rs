//! Process-level shutdown triggers.
//!
//! Ctrl-C (SIGINT) and end-of-file on standard input both stop the proxy.

use tokio::io::AsyncReadExt;

use crate::lifecycle::Shutdown;

/// What ended the wait in [`wait_for_trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interrupt,
    StdinClosed,
}

/// Resolve once Ctrl-C is pressed or stdin reaches EOF.
pub async fn wait_for_trigger() -> Trigger {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                // Without a signal handler only stdin can stop us.
                stdin_eof().await;
                return Trigger::StdinClosed;
            }
            Trigger::Interrupt
        }
        _ = stdin_eof() => Trigger::StdinClosed,
    }
}

/// Drain stdin until it is closed.
async fn stdin_eof() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

/// Wait for a trigger, then fire `shutdown`.
pub async fn trigger_on_signal(shutdown: Shutdown) {
    let trigger = wait_for_trigger().await;
    tracing::info!(?trigger, "Shutdown signal received");
    shutdown.trigger();
}
