//! Terminal audit panel.
//!
//! Shows every entry newest first, kicks off analysis for entries that need
//! it, and re-renders an entry's results once its analysis resolves. Output
//! is produced as text blocks; the caller decides where they go.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalysisClient;
use crate::bridge::{InspectedPage, PollerCommand};
use crate::export::{self, ExportError};
use crate::gesture::clear_expression;
use crate::models::{ApiResults, EntryPatch, LogEntry};
use crate::store::LogStore;

mod render;

pub use render::{needs_analysis, render_entry, render_results, render_results_block};

/// Analysis finished for one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDone {
    pub id: String,
    pub results: ApiResults,
}

pub struct Panel {
    store: LogStore,
    analyzer: Option<Arc<AnalysisClient>>,
    page: Option<Arc<dyn InspectedPage>>,
    poller: Option<mpsc::UnboundedSender<PollerCommand>>,
    done_tx: mpsc::UnboundedSender<AnalysisDone>,
    done_rx: mpsc::UnboundedReceiver<AnalysisDone>,
    in_flight: HashSet<String>,
}

impl Panel {
    pub fn new(store: LogStore) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            store,
            analyzer: None,
            page: None,
            poller: None,
            done_tx,
            done_rx,
            in_flight: HashSet::new(),
        }
    }

    /// Without an analyzer, entries are shown but never analyzed.
    pub fn with_analyzer(mut self, analyzer: Arc<AnalysisClient>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Page whose buffer is emptied on clear.
    pub fn with_page(mut self, page: Arc<dyn InspectedPage>) -> Self {
        self.page = Some(page);
        self
    }

    /// Poller whose cursor is reset on clear.
    pub fn with_poller(mut self, commands: mpsc::UnboundedSender<PollerCommand>) -> Self {
        self.poller = Some(commands);
        self
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Render every stored entry newest first and start analysis for the
    /// ones still pending.
    pub async fn load(&mut self) -> Vec<String> {
        let entries = self.store.get_all().await;
        let mut blocks = Vec::with_capacity(entries.len());
        for entry in entries.iter().rev() {
            blocks.push(render_entry(entry));
            self.spawn_analysis(entry);
        }
        blocks
    }

    /// Show a freshly drained entry.
    pub fn ingest(&mut self, entry: &LogEntry) -> String {
        self.spawn_analysis(entry);
        render_entry(entry)
    }

    /// Start background analysis when the entry needs it and none is
    /// running for it yet. Returns whether a task was spawned.
    pub fn spawn_analysis(&mut self, entry: &LogEntry) -> bool {
        let Some(analyzer) = self.analyzer.clone() else {
            return false;
        };
        if !needs_analysis(entry) || !self.in_flight.insert(entry.id.clone()) {
            return false;
        }

        let done_tx = self.done_tx.clone();
        let id = entry.id.clone();
        let url = entry.original_url.clone();
        tokio::spawn(async move {
            let results = analyzer.analyze(&url).await;
            let _ = done_tx.send(AnalysisDone { id, results });
        });
        true
    }

    /// Wait for the next background analysis to finish.
    pub async fn next_analysis(&mut self) -> Option<AnalysisDone> {
        if self.in_flight.is_empty() {
            return None;
        }
        self.done_rx.recv().await
    }

    /// Persist finished results and render the updated block. `None` when
    /// the entry is gone (log cleared while the analysis ran).
    pub async fn apply_analysis(&mut self, done: AnalysisDone) -> Option<String> {
        self.in_flight.remove(&done.id);
        let updated = self
            .store
            .update(&done.id, EntryPatch::results(done.results.clone()))
            .await;
        if !updated {
            info!("Dropping analysis for {}: entry no longer stored", done.id);
            return None;
        }
        Some(format!(
            "[{}] results\n{}",
            done.id,
            render_results(&done.results)
        ))
    }

    /// Analyze one stored entry in the foreground and persist the result.
    pub async fn analyze_entry(&self, id: &str) -> Option<ApiResults> {
        let analyzer = self.analyzer.as_ref()?;
        let entry = self.store.get(id).await?;
        if !needs_analysis(&entry) {
            return None;
        }
        let results = analyzer.analyze(&entry.original_url).await;
        if self
            .store
            .update(id, EntryPatch::results(results.clone()))
            .await
        {
            Some(results)
        } else {
            None
        }
    }

    pub async fn set_qa(&self, id: &str, approved: bool) -> bool {
        self.store.update(id, EntryPatch::qa(approved)).await
    }

    /// Empty the log, the poller cursor and, when reachable, the in-page
    /// buffer.
    pub async fn clear(&mut self) {
        self.store.clear().await;
        self.in_flight.clear();

        // Empty the buffer before rewinding, or the poller re-drains it.
        if let Some(page) = &self.page {
            if let Err(err) = page.evaluate(&clear_expression()).await {
                warn!("Could not clear in-page buffer: {err}");
            }
        }
        if let Some(poller) = &self.poller {
            let _ = poller.send(PollerCommand::ResetCursor);
        }
        info!("Audit log cleared");
    }

    pub async fn export(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let entries = self.store.get_all().await;
        export::export_to_dir(&entries, dir, export::export_date())
    }

    /// Live view: print new entries as they arrive and their results as
    /// they resolve, until cancelled. Once the entry stream ends, waits for
    /// the analyses still running.
    pub async fn run(
        mut self,
        mut entries: mpsc::UnboundedReceiver<LogEntry>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                entry = entries.recv() => match entry {
                    Some(entry) => println!("{}\n", self.ingest(&entry)),
                    None => break,
                },
                Some(done) = self.done_rx.recv() => {
                    if let Some(block) = self.apply_analysis(done).await {
                        println!("{block}");
                    }
                }
            }
        }

        loop {
            let done = tokio::select! {
                _ = cancel.cancelled() => None,
                done = self.next_analysis() => done,
            };
            let Some(done) = done else {
                break;
            };
            if let Some(block) = self.apply_analysis(done).await {
                println!("{block}");
            }
        }
    }
}
