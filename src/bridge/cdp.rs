use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{info, warn};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

use super::{classify_eval_error, EvalError, InspectedPage, NavigationEvent};
use crate::gesture::location_expression;

/// A tab in a Chrome instance started with `--remote-debugging-port`.
pub struct CdpPage {
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl CdpPage {
    /// Connect to `127.0.0.1:<port>` and pick the first page whose URL
    /// contains `page_filter` (or simply the first page).
    pub async fn connect(port: u16, page_filter: Option<&str>) -> Result<Self> {
        let debug_url = format!("http://127.0.0.1:{port}");
        let (browser, mut handler) = Browser::connect(&debug_url)
            .await
            .with_context(|| format!("failed to connect to Chrome on port {port}"))?;

        let handler = tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

        let pages = browser
            .pages()
            .await
            .context("failed to list Chrome pages")?;
        if pages.is_empty() {
            bail!("Chrome on port {port} has no open pages");
        }

        let mut selected = None;
        let mut fallback = None;
        for page in pages {
            let url: String = page
                .evaluate(location_expression().as_str())
                .await
                .map(|v| v.into_value().unwrap_or_default())
                .unwrap_or_default();
            info!("[cdp] candidate page {url}");

            let matches = page_filter.map_or(true, |filter| url.contains(filter));
            if matches {
                selected = Some((page, url));
                break;
            }
            if fallback.is_none() {
                fallback = Some((page, url));
            }
        }

        let (page, url) = match (selected, page_filter) {
            (Some(found), _) => found,
            (None, Some(filter)) => {
                let fallback = fallback.context("no inspectable page found")?;
                warn!(
                    "[cdp] no page matched {filter:?}; inspecting {} instead",
                    fallback.1
                );
                fallback
            }
            (None, None) => fallback.context("no inspectable page found")?,
        };

        info!("[cdp] inspecting {url}");
        Ok(Self {
            _browser: browser,
            page,
            handler,
        })
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl InspectedPage for CdpPage {
    async fn evaluate(&self, expression: &str) -> Result<Value, EvalError> {
        let mut params = EvaluateParams::new(expression);
        params.return_by_value = Some(true);
        params.await_promise = Some(true);

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|err| classify_eval_error(&err.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn navigation_events(&self) -> Result<mpsc::UnboundedReceiver<NavigationEvent>> {
        let mut events = self
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .context("failed to subscribe to frame navigations")?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.frame.parent_id.is_some() {
                    continue;
                }
                let navigation = NavigationEvent {
                    url: event.frame.url.clone(),
                };
                if tx.send(navigation).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
