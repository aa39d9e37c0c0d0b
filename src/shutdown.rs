use anyhow::Result;
use tracing::info;

/// Waits for SIGINT/SIGTERM so the worker loop can stop between cycles
/// instead of mid-transition. Every finalize/reconcile transition is
/// idempotent, so cancellation here never leaves stored state half-written.
pub struct ShutdownSignal;

impl ShutdownSignal {
    pub async fn wait() -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
        }

        info!("shutdown signal received, stopping after the current cycle");
        Ok(())
    }
}
