//! Cooperative shutdown shared by the long-running loops.
//!
//! A [`Lifecycle`] owns the sender side; every loop holds a [`ShutdownSignal`]
//! and checks it once per iteration or races it against its sleeps and reads.

use tokio::sync::watch;
use tracing::info;

pub struct Lifecycle {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn shutdown(&self) {
        if !*self.tx.borrow() {
            info!("Shutdown requested");
        }
        self.tx.send_replace(true);
    }

    /// Requests shutdown on Ctrl-C or SIGTERM.
    pub fn spawn_signal_listener(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            wait_for_os_signal().await;
            self.shutdown();
        })
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested, or the lifecycle was dropped.
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleeps for `duration`; returns `false` if shutdown cut the sleep short.
    pub async fn sleep(&mut self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = wait_for_ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    until_delivered("Ctrl-C", tokio::signal::ctrl_c()).await;
}

/// Resolves when `signal` is delivered. A handler that failed to install
/// never resolves, so it cannot be mistaken for a shutdown request.
async fn until_delivered<F>(name: &str, signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to install {} handler: {}", name, e);
        std::future::pending::<()>().await;
    }
}
