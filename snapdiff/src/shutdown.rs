//! SIGINT/SIGTERM handling.
//!
//! The pipeline is synchronous, so signals are watched from a dedicated
//! thread running a small current-thread runtime. A signal cancels the
//! shared token; the pipeline notices at its next checkpoint.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::errors::Result;

/// Shutdown coordinator
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to poll at checkpoints.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start watching for signals. Handlers are registered before this
    /// returns.
    pub fn install(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (mut interrupt, mut terminate) = {
            let _guard = runtime.enter();
            (
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
            )
        };

        let token = self.token.clone();
        std::thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    tokio::select! {
                        _ = interrupt.recv() => {
                            info!("Received SIGINT, stopping after the current object");
                        }
                        _ = terminate.recv() => {
                            info!("Received SIGTERM, stopping after the current object");
                        }
                        _ = token.cancelled() => {
                            debug!("Signal watcher released");
                            return;
                        }
                    }
                    token.cancel();
                })
            })?;

        Ok(())
    }

    /// Request shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}
