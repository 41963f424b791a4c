use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::poller::{Poller, PollerCommand};

pub struct PollerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    command_tx: Option<mpsc::UnboundedSender<PollerCommand>>,
}

impl Default for PollerController {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            command_tx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the poll loop. Navigation events are subscribed here so the
    /// loop sees every navigation after its first injection.
    pub async fn start(&mut self, poller: Poller) -> Result<()> {
        if self.handle.is_some() {
            bail!("poller already running");
        }

        let navigations = match poller.page().navigation_events().await {
            Ok(rx) => Some(rx),
            Err(err) => {
                warn!("Navigation events unavailable, relying on invalidation recovery: {err:#}");
                None
            }
        };

        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        info!("Starting poller at cursor {}", poller.cursor());
        let handle = tokio::spawn(poller.run(command_rx, navigations, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.command_tx = Some(command_tx);
        Ok(())
    }

    /// Handle the panel can use to reset the cursor after clearing.
    pub fn commands(&self) -> Option<mpsc::UnboundedSender<PollerCommand>> {
        self.command_tx.clone()
    }

    pub fn reset_cursor(&self) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(PollerCommand::ResetCursor);
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.command_tx = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("poller task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
