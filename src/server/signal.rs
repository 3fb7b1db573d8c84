//! Termination signal capture.

use tokio::sync::oneshot;
use tracing::info;

/// Spawns a task that waits for the first termination signal and then
/// resolves the returned receiver, exactly once.
///
/// On unix the signals are SIGHUP, SIGQUIT, SIGTERM and SIGINT; elsewhere
/// only Ctrl-C. Handlers are installed before this returns, so a signal
/// arriving right after startup is not lost.
pub fn spawn_signal_listener() -> std::io::Result<oneshot::Receiver<()>> {
    let (tx, rx) = oneshot::channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        let mut quit = signal(SignalKind::quit())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = hangup.recv() => "SIGHUP",
                _ = quit.recv() => "SIGQUIT",
                _ = terminate.recv() => "SIGTERM",
                _ = interrupt.recv() => "SIGINT",
            };
            info!(signal = name, "Shutdown signal received");
            let _ = tx.send(());
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(signal = "ctrl-c", "Shutdown signal received");
            let _ = tx.send(());
        }
    });

    Ok(rx)
}
