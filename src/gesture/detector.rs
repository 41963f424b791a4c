use std::collections::HashMap;

use crate::decoder::decode_image_url;
use crate::models::{BufferRecord, NO_SLIDE};

pub const DEFAULT_MIN_SWIPE_DISTANCE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
}

impl TouchPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swipe {
    pub dx: f64,
    pub dy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    Idle,
    TouchActive { start: TouchPoint },
}

/// Per-element touch state machine.
#[derive(Debug, Clone)]
pub struct SwipeTracker {
    threshold: f64,
    state: TrackerState,
}

impl SwipeTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: TrackerState::Idle,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn touch_start(&mut self, point: TouchPoint) {
        self.state = TrackerState::TouchActive { start: point };
    }

    /// Returns the swipe when either axis moved strictly more than the
    /// threshold. Always returns to `Idle`.
    pub fn touch_end(&mut self, point: TouchPoint) -> Option<Swipe> {
        let TrackerState::TouchActive { start } = std::mem::replace(&mut self.state, TrackerState::Idle)
        else {
            return None;
        };

        let dx = point.x - start.x;
        let dy = point.y - start.y;
        if dx.abs() > self.threshold || dy.abs() > self.threshold {
            Some(Swipe { dx, dy })
        } else {
            None
        }
    }
}

/// Rust model of the injected detector: which carousel elements have
/// listeners attached, and each one's touch state.
#[derive(Debug, Clone)]
pub struct SwipeDetector {
    threshold: f64,
    trackers: HashMap<String, SwipeTracker>,
}

impl SwipeDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            trackers: HashMap::new(),
        }
    }

    pub fn is_attached(&self, element_id: &str) -> bool {
        self.trackers.contains_key(element_id)
    }

    pub fn attached_count(&self) -> usize {
        self.trackers.len()
    }

    /// Attach to every matching element not seen before. Returns how many
    /// were newly attached.
    pub fn scan<'a, I>(&mut self, matching: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut attached = 0;
        for element_id in matching {
            if !self.trackers.contains_key(element_id) {
                self.trackers
                    .insert(element_id.to_string(), SwipeTracker::new(self.threshold));
                attached += 1;
            }
        }
        attached
    }

    pub fn touch_start(&mut self, element_id: &str, point: TouchPoint) {
        if let Some(tracker) = self.trackers.get_mut(element_id) {
            tracker.touch_start(point);
        }
    }

    pub fn touch_end(&mut self, element_id: &str, point: TouchPoint) -> Option<Swipe> {
        self.trackers
            .get_mut(element_id)
            .and_then(|tracker| tracker.touch_end(point))
    }

    /// Buffer record for a detected swipe, built from the active slide.
    pub fn record(page_url: &str, active_slide_src: Option<&str>) -> BufferRecord {
        let (original_url, encoded) = match active_slide_src.filter(|src| !src.is_empty()) {
            Some(src) => {
                let decoded = decode_image_url(Some(src));
                (decoded.original_url, decoded.encoded)
            }
            None => (NO_SLIDE.to_string(), String::new()),
        };

        BufferRecord {
            page_url: page_url.to_string(),
            original_url,
            encoded,
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SwipeTracker {
        SwipeTracker::new(DEFAULT_MIN_SWIPE_DISTANCE)
    }

    #[test]
    fn horizontal_swipe_over_threshold_fires() {
        let mut t = tracker();
        t.touch_start(TouchPoint::new(300.0, 200.0));
        let swipe = t.touch_end(TouchPoint::new(120.0, 210.0)).unwrap();
        assert_eq!(swipe, Swipe { dx: -180.0, dy: 10.0 });
        assert_eq!(t.state(), TrackerState::Idle);
    }

    #[test]
    fn vertical_swipe_fires() {
        let mut t = tracker();
        t.touch_start(TouchPoint::new(100.0, 100.0));
        assert!(t.touch_end(TouchPoint::new(100.0, 251.0)).is_some());
    }

    #[test]
    fn exact_threshold_is_discarded() {
        let mut t = tracker();
        t.touch_start(TouchPoint::new(100.0, 100.0));
        assert!(t.touch_end(TouchPoint::new(150.0, 150.0)).is_none());
        assert_eq!(t.state(), TrackerState::Idle);
    }

    #[test]
    fn touch_end_without_start_is_ignored() {
        let mut t = tracker();
        assert!(t.touch_end(TouchPoint::new(500.0, 0.0)).is_none());
    }

    #[test]
    fn scan_attaches_each_element_once() {
        let mut detector = SwipeDetector::new(DEFAULT_MIN_SWIPE_DISTANCE);
        assert_eq!(detector.scan(["a", "b"]), 2);
        assert_eq!(detector.scan(["a", "b", "c"]), 1);
        assert_eq!(detector.attached_count(), 3);
        assert!(detector.is_attached("c"));
    }

    #[test]
    fn touches_on_unattached_elements_do_nothing() {
        let mut detector = SwipeDetector::new(DEFAULT_MIN_SWIPE_DISTANCE);
        detector.touch_start("ghost", TouchPoint::new(0.0, 0.0));
        assert!(detector
            .touch_end("ghost", TouchPoint::new(400.0, 0.0))
            .is_none());
    }

    #[test]
    fn record_without_active_slide_uses_sentinel() {
        let record = SwipeDetector::record("https://news.example/", None);
        assert_eq!(record.original_url, NO_SLIDE);
        assert_eq!(record.encoded, "");
    }

    #[test]
    fn record_decodes_active_slide_src() {
        let src = "https://cdn.example.com/abc/https%3A%2F%2Fimg.example.com%2Fphoto.jpg";
        let record = SwipeDetector::record("https://news.example/", Some(src));
        assert_eq!(record.original_url, "https://img.example.com/photo.jpg");
        assert_eq!(record.encoded, src);
        assert_eq!(record.page_url, "https://news.example/");
    }
}
