//! A live audit: poller and panel wired to one inspected page.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalysisClient;
use crate::bridge::{InspectedPage, Poller, PollerController};
use crate::panel::Panel;
use crate::settings::AuditSettings;
use crate::store::LogStore;

pub struct LiveSession {
    poller: PollerController,
    panel: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl LiveSession {
    /// Print the stored log, then start polling `page` and rendering what
    /// it yields.
    pub async fn start(
        page: Arc<dyn InspectedPage>,
        store: LogStore,
        analyzer: Option<Arc<AnalysisClient>>,
        settings: &AuditSettings,
    ) -> Result<Self> {
        let mut panel = Panel::new(store.clone()).with_page(page.clone());
        if let Some(analyzer) = analyzer {
            panel = panel.with_analyzer(analyzer);
        }

        let stored = panel.load().await;
        if stored.is_empty() {
            println!("No logs yet. Swipe on a carousel to see entries.\n");
        }
        for block in &stored {
            println!("{block}\n");
        }

        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        let poller = Poller::new(page, store, settings.poll.clone(), &settings.gesture)
            .with_entry_sink(entry_tx);

        let mut controller = PollerController::new();
        controller.start(poller).await?;
        if let Some(commands) = controller.commands() {
            panel = panel.with_poller(commands);
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(panel.run(entry_rx, cancel_token.clone()));

        Ok(Self {
            poller: controller,
            panel: handle,
            cancel_token,
        })
    }

    /// Stop polling and let the panel finish the analyses still running.
    pub async fn finish(mut self) -> Result<()> {
        self.poller.stop().await?;
        self.panel.await.context("panel task failed to join")
    }

    /// Stop everything now; pending analyses are abandoned.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down live session");
        self.cancel_token.cancel();
        self.poller.stop().await?;
        self.panel.await.context("panel task failed to join")
    }
}
