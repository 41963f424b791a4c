use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{classify_eval_error, EvalError, InspectedPage, NavigationEvent};
use crate::gesture::{ScriptKind, SwipeDetector, TouchPoint};
use crate::settings::GestureSettings;

const STALE_CONTEXT_MESSAGE: &str = "Error -32602: Cannot find context with specified id";

struct Document {
    url: String,
    carousels: Vec<String>,
    active_slide_src: Option<String>,
    /// Present once the detector is installed (the guard flag is set).
    detector: Option<SwipeDetector>,
    buffer: Option<Vec<Value>>,
    /// The drain position a previous drain left in the page.
    drained: usize,
}

impl Document {
    fn fresh(url: String, carousels: Vec<String>, active_slide_src: Option<String>) -> Self {
        Self {
            url,
            carousels,
            active_slide_src,
            detector: None,
            buffer: None,
            drained: 0,
        }
    }

    fn reload(&mut self, url: String) {
        let carousels = std::mem::take(&mut self.carousels);
        let active = self.active_slide_src.take();
        *self = Document::fresh(url, carousels, active);
    }
}

struct PageState {
    document: Document,
    stale_evaluations: usize,
    failing_evaluations: Vec<String>,
    injections: usize,
    installs: usize,
    subscribers: Vec<mpsc::UnboundedSender<NavigationEvent>>,
}

/// In-memory inspected page. Runs the Rust model of the swipe detector and
/// answers the bridge's expressions the way the injected script would.
///
/// Navigation keeps the carousel markup and active slide (same site
/// template) but drops the installed detector and the buffer, like a real
/// document swap.
pub struct SimulatedPage {
    threshold: f64,
    state: Mutex<PageState>,
}

impl SimulatedPage {
    pub fn new(url: &str, gesture: &GestureSettings) -> Self {
        Self {
            threshold: gesture.min_swipe_distance,
            state: Mutex::new(PageState {
                document: Document::fresh(url.to_string(), Vec::new(), None),
                stale_evaluations: 0,
                failing_evaluations: Vec::new(),
                injections: 0,
                installs: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a carousel element. An installed detector picks it up the way the
    /// mutation observer would.
    pub fn mount_carousel(&self, element_id: &str) {
        let mut state = self.lock();
        let document = &mut state.document;
        if !document.carousels.iter().any(|id| id == element_id) {
            document.carousels.push(element_id.to_string());
        }
        if let Some(detector) = document.detector.as_mut() {
            detector.scan(document.carousels.iter().map(String::as_str));
        }
    }

    pub fn set_active_slide(&self, src: Option<&str>) {
        self.lock().document.active_slide_src = src.map(str::to_string);
    }

    /// Touch down at `from`, lift at `to` on `element_id`. Returns whether
    /// a swipe record was buffered.
    pub fn swipe(&self, element_id: &str, from: TouchPoint, to: TouchPoint) -> bool {
        let mut state = self.lock();
        let document = &mut state.document;
        let Some(detector) = document.detector.as_mut() else {
            return false;
        };

        detector.touch_start(element_id, from);
        if detector.touch_end(element_id, to).is_none() {
            return false;
        }

        let record = SwipeDetector::record(&document.url, document.active_slide_src.as_deref());
        let value = serde_json::to_value(record).unwrap_or(Value::Null);
        document.buffer.get_or_insert_with(Vec::new).push(value);
        true
    }

    /// Host-reported navigation: new document, subscribers notified.
    pub fn navigate(&self, url: &str) {
        let mut state = self.lock();
        state.document.reload(url.to_string());
        let event = NavigationEvent {
            url: url.to_string(),
        };
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Silent document swap: no navigation event, and the next evaluation
    /// fails with the stale-context error.
    pub fn invalidate_context(&self) {
        let mut state = self.lock();
        let url = state.document.url.clone();
        state.document.reload(url);
        state.stale_evaluations += 1;
    }

    /// Make the next evaluation fail with an ordinary error.
    pub fn fail_next_evaluation(&self, message: &str) {
        self.lock().failing_evaluations.push(message.to_string());
    }

    pub fn buffer_len(&self) -> usize {
        self.lock().document.buffer.as_ref().map_or(0, Vec::len)
    }

    pub fn is_installed(&self) -> bool {
        self.lock().document.detector.is_some()
    }

    pub fn attached_count(&self) -> usize {
        self.lock()
            .document
            .detector
            .as_ref()
            .map_or(0, SwipeDetector::attached_count)
    }

    /// How many times the injection script was evaluated.
    pub fn injection_count(&self) -> usize {
        self.lock().injections
    }

    /// How many of those evaluations actually installed the detector.
    pub fn install_count(&self) -> usize {
        self.lock().installs
    }

    fn run(&self, kind: ScriptKind) -> Value {
        let threshold = self.threshold;
        let mut state = self.lock();
        match kind {
            ScriptKind::Inject => {
                state.injections += 1;
                let document = &mut state.document;
                if document.detector.is_some() {
                    return Value::Bool(false);
                }
                let mut detector = SwipeDetector::new(threshold);
                detector.scan(document.carousels.iter().map(String::as_str));
                document.detector = Some(detector);
                document.buffer.get_or_insert_with(Vec::new);
                state.installs += 1;
                Value::Bool(true)
            }
            ScriptKind::Drain { from } => {
                let document = &mut state.document;
                let Some(buffer) = document.buffer.as_ref() else {
                    return Value::Array(Vec::new());
                };
                let slice = buffer.get(from..).map(<[Value]>::to_vec).unwrap_or_default();
                document.drained = from + slice.len();
                Value::Array(slice)
            }
            ScriptKind::Drained => {
                let document = &state.document;
                let len = document.buffer.as_ref().map_or(0, Vec::len);
                Value::from(document.drained.min(len))
            }
            ScriptKind::Clear => {
                if let Some(buffer) = state.document.buffer.as_mut() {
                    buffer.clear();
                }
                state.document.drained = 0;
                Value::Bool(true)
            }
            ScriptKind::Location => Value::String(state.document.url.clone()),
        }
    }
}

#[async_trait]
impl InspectedPage for SimulatedPage {
    async fn evaluate(&self, expression: &str) -> Result<Value, EvalError> {
        {
            let mut state = self.lock();
            if state.stale_evaluations > 0 {
                state.stale_evaluations -= 1;
                return Err(classify_eval_error(STALE_CONTEXT_MESSAGE));
            }
            if !state.failing_evaluations.is_empty() {
                let message = state.failing_evaluations.remove(0);
                return Err(classify_eval_error(&message));
            }
        }

        match ScriptKind::classify(expression) {
            Some(kind) => Ok(self.run(kind)),
            None => Err(EvalError::Failed(format!(
                "unsupported expression: {}",
                expression.chars().take(40).collect::<String>()
            ))),
        }
    }

    async fn navigation_events(&self) -> Result<mpsc::UnboundedReceiver<NavigationEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{clear_expression, drain_expression, drained_expression, injection_script};

    fn page() -> SimulatedPage {
        let page = SimulatedPage::new("https://news.example/story", &GestureSettings::default());
        page.mount_carousel("gallery");
        page.set_active_slide(Some(
            "https://cdn.example.com/abc/https%3A%2F%2Fimg.example.com%2Fphoto.jpg",
        ));
        page
    }

    fn left_swipe(page: &SimulatedPage, element: &str) -> bool {
        page.swipe(element, TouchPoint::new(300.0, 100.0), TouchPoint::new(100.0, 100.0))
    }

    #[tokio::test]
    async fn swipes_before_injection_are_not_recorded() {
        let page = page();
        assert!(!left_swipe(&page, "gallery"));
        assert_eq!(page.buffer_len(), 0);
    }

    #[tokio::test]
    async fn injection_is_guarded() {
        let page = page();
        let script = injection_script(&GestureSettings::default());
        assert_eq!(page.evaluate(&script).await.unwrap(), Value::Bool(true));
        assert_eq!(page.evaluate(&script).await.unwrap(), Value::Bool(false));
        assert_eq!(page.injection_count(), 2);
        assert_eq!(page.install_count(), 1);
        assert_eq!(page.attached_count(), 1);
    }

    #[tokio::test]
    async fn observer_attaches_late_carousels() {
        let page = page();
        page.evaluate(&injection_script(&GestureSettings::default()))
            .await
            .unwrap();
        assert!(!left_swipe(&page, "late"));

        page.mount_carousel("late");
        assert_eq!(page.attached_count(), 2);
        assert!(left_swipe(&page, "late"));
    }

    #[tokio::test]
    async fn drain_slices_from_cursor() {
        let page = page();
        page.evaluate(&injection_script(&GestureSettings::default()))
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(left_swipe(&page, "gallery"));
        }
        assert!(!page.swipe(
            "gallery",
            TouchPoint::new(100.0, 100.0),
            TouchPoint::new(120.0, 110.0)
        ));

        let all = page.evaluate(&drain_expression(0)).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);
        assert_eq!(
            all[0]["originalUrl"],
            Value::String("https://img.example.com/photo.jpg".into())
        );
        let tail = page.evaluate(&drain_expression(2)).await.unwrap();
        assert_eq!(tail.as_array().unwrap().len(), 1);
        let past_end = page.evaluate(&drain_expression(9)).await.unwrap();
        assert_eq!(past_end, Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn page_remembers_drain_position() {
        let page = page();
        page.evaluate(&injection_script(&GestureSettings::default()))
            .await
            .unwrap();
        assert_eq!(page.evaluate(&drained_expression()).await.unwrap(), 0);

        for _ in 0..3 {
            left_swipe(&page, "gallery");
        }
        page.evaluate(&drain_expression(0)).await.unwrap();
        left_swipe(&page, "gallery");
        assert_eq!(page.evaluate(&drained_expression()).await.unwrap(), 3);

        page.evaluate(&clear_expression()).await.unwrap();
        assert_eq!(page.evaluate(&drained_expression()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalidation_fails_once_then_recovers_with_empty_page() {
        let page = page();
        page.evaluate(&injection_script(&GestureSettings::default()))
            .await
            .unwrap();
        left_swipe(&page, "gallery");

        page.invalidate_context();
        let err = page.evaluate(&drain_expression(0)).await.unwrap_err();
        assert!(err.is_context_invalidated());
        assert!(!page.is_installed());
        assert_eq!(
            page.evaluate(&drain_expression(0)).await.unwrap(),
            Value::Array(Vec::new())
        );
    }

    #[tokio::test]
    async fn navigation_notifies_subscribers() {
        let page = page();
        let mut events = page.navigation_events().await.unwrap();
        page.navigate("https://news.example/next");
        assert_eq!(
            events.recv().await.unwrap(),
            NavigationEvent {
                url: "https://news.example/next".into()
            }
        );
    }
}
