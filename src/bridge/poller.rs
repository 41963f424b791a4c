use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use super::{EvalError, InspectedPage, NavigationEvent};
use crate::gesture::{drain_expression, drained_expression, injection_script};
use crate::models::{BufferRecord, LogEntry};
use crate::settings::{GestureSettings, PollSettings};
use crate::store::LogStore;

// Set to true to enable per-cycle logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    /// The page buffer was emptied out-of-band (log cleared).
    ResetCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Drained(usize),
    Empty,
    /// Cursor was reset; the caller re-injects after the stabilization delay.
    ContextInvalidated,
    /// Transient failure; retry after the normal interval.
    Failed,
}

/// Pull-based drain of the page-global buffer.
///
/// The poller owns the read cursor. It only ever advances by the length of
/// a successfully drained slice, so a failed round trip never loses
/// records. The one exception is a context invalidation, where the old
/// buffer is gone and the cursor restarts at zero.
///
/// The cursor indexes the page buffer, not the store. When attaching to a
/// page that already runs the detector, it resumes from the drain position
/// the page recorded.
pub struct Poller {
    page: Arc<dyn InspectedPage>,
    store: LogStore,
    poll: PollSettings,
    injection: String,
    cursor: usize,
    entries: Option<mpsc::UnboundedSender<LogEntry>>,
}

impl Poller {
    pub fn new(
        page: Arc<dyn InspectedPage>,
        store: LogStore,
        poll: PollSettings,
        gesture: &GestureSettings,
    ) -> Self {
        Self {
            page,
            store,
            poll,
            injection: injection_script(gesture),
            cursor: 0,
            entries: None,
        }
    }

    /// Forward every newly stored entry to `sink`.
    pub fn with_entry_sink(mut self, sink: mpsc::UnboundedSender<LogEntry>) -> Self {
        self.entries = Some(sink);
        self
    }

    pub fn page(&self) -> &Arc<dyn InspectedPage> {
        &self.page
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Evaluate the installer. `Ok(false)` means the page already had it.
    pub async fn inject(&self) -> Result<bool, EvalError> {
        let value = self.page.evaluate(&self.injection).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// One drain round trip.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let value = match self.page.evaluate(&drain_expression(self.cursor)).await {
            Ok(value) => value,
            Err(EvalError::ContextInvalidated(message)) => {
                log_warn!("Inspected page context invalidated ({message}); resetting cursor");
                self.cursor = 0;
                return PollOutcome::ContextInvalidated;
            }
            Err(EvalError::Failed(message)) => {
                log_debug!("Poll failed, will retry: {message}");
                return PollOutcome::Failed;
            }
        };

        let Value::Array(items) = value else {
            return PollOutcome::Empty;
        };
        if items.is_empty() {
            return PollOutcome::Empty;
        }

        let count = items.len();
        for item in items {
            let record = match serde_json::from_value::<BufferRecord>(item) {
                Ok(record) => record,
                Err(err) => {
                    log_warn!("Skipping malformed buffer record: {err}");
                    continue;
                }
            };

            let entry = LogEntry::from_record(record, Utc::now());
            if self.store.append(entry.clone()).await.is_none() {
                log_error!("Entry {} shown but not persisted", entry.id);
            }
            if let Some(sink) = &self.entries {
                let _ = sink.send(entry);
            }
        }

        self.cursor += count;
        log_info!("Drained {count} swipe record(s); cursor at {}", self.cursor);
        PollOutcome::Drained(count)
    }

    /// Inject, retrying after the stabilization delay while the context is
    /// still invalid. Other failures are logged and left to the next
    /// navigation or invalidation to retry.
    ///
    /// A fresh install means a fresh, empty buffer, so the cursor restarts.
    pub async fn reinject(&mut self, cancel: &CancellationToken) {
        loop {
            match self.inject().await {
                Ok(true) => {
                    log_info!("Swipe detection injected");
                    self.cursor = 0;
                    return;
                }
                Ok(false) => {
                    log_debug!("Swipe detection already present in page");
                    self.resume_cursor().await;
                    return;
                }
                Err(EvalError::ContextInvalidated(message)) => {
                    log_warn!("Context invalidated during injection ({message}); retrying");
                    if !pause(self.poll.stabilize_delay(), cancel).await {
                        return;
                    }
                }
                Err(EvalError::Failed(message)) => {
                    log_warn!("Error injecting swipe detection: {message}");
                    return;
                }
            }
        }
    }

    /// Adopt the drain position recorded in the page. On failure the cursor
    /// is left alone and the next attach tries again.
    async fn resume_cursor(&mut self) {
        match self.page.evaluate(&drained_expression()).await {
            Ok(value) => {
                let drained = value.as_u64().unwrap_or(0) as usize;
                if drained != self.cursor {
                    log_info!("Resuming page buffer at {drained} (cursor was {})", self.cursor);
                }
                self.cursor = drained;
            }
            Err(err) => log_warn!("Could not read page drain position: {err}"),
        }
    }

    /// Self-rescheduling poll loop. Each cycle sleeps only after it has
    /// finished, so cycles never overlap or queue up.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<PollerCommand>,
        mut navigations: Option<mpsc::UnboundedReceiver<NavigationEvent>>,
        cancel: CancellationToken,
    ) {
        self.reinject(&cancel).await;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if self.poll_once().await == PollOutcome::ContextInvalidated {
                if !pause(self.poll.stabilize_delay(), &cancel).await {
                    break;
                }
                self.reinject(&cancel).await;
            }

            let wait = sleep(self.poll.interval());
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log_info!("Poller shutting down at cursor {}", self.cursor);
                        return;
                    }
                    _ = &mut wait => break,
                    Some(command) = commands.recv() => match command {
                        PollerCommand::ResetCursor => self.reset_cursor(),
                    },
                    Some(navigation) = next_navigation(&mut navigations) => {
                        log_info!("Page navigated to {}; resetting and re-injecting", navigation.url);
                        self.reset_cursor();
                        if !pause(self.poll.navigation_delay(), &cancel).await {
                            return;
                        }
                        self.reinject(&cancel).await;
                    }
                }
            }
        }
    }
}

async fn next_navigation(
    navigations: &mut Option<mpsc::UnboundedReceiver<NavigationEvent>>,
) -> Option<NavigationEvent> {
    match navigations {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
