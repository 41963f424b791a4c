//! Expressions evaluated inside the inspected page.
//!
//! Each rendered expression opens with an `/* imgaudit:<kind> */` marker so
//! the simulated page can tell them apart without a JS engine.

use serde::Serialize;

use crate::models::{NO_EXTRACT, NO_SLIDE};
use crate::settings::GestureSettings;

/// Page-global array the detector appends swipe records to.
pub const BUFFER_GLOBAL: &str = "__imgAuditLogs";
/// Page-global flag set once the detector is installed.
pub const GUARD_GLOBAL: &str = "__imgAuditSwipeListener";
/// Per-element expando marking an attached carousel.
pub const ATTACHED_FLAG: &str = "__imgAuditSwipeAttached";
/// Page-global count of buffer records already handed out by a drain.
pub const DRAINED_GLOBAL: &str = "__imgAuditDrained";

const INJECT_TEMPLATE: &str = include_str!("inject.js");

const INJECT_MARKER: &str = "/* imgaudit:inject */";
const DRAIN_MARKER: &str = "/* imgaudit:drain:";
const CLEAR_MARKER: &str = "/* imgaudit:clear */";
const LOCATION_MARKER: &str = "/* imgaudit:location */";
const DRAINED_MARKER: &str = "/* imgaudit:drained */";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    Inject,
    Drain { from: usize },
    Clear,
    Location,
    Drained,
}

impl ScriptKind {
    pub fn classify(expression: &str) -> Option<Self> {
        let head = expression.trim_start();
        if head.starts_with(INJECT_MARKER) {
            return Some(ScriptKind::Inject);
        }
        if head.starts_with(CLEAR_MARKER) {
            return Some(ScriptKind::Clear);
        }
        if head.starts_with(LOCATION_MARKER) {
            return Some(ScriptKind::Location);
        }
        if head.starts_with(DRAINED_MARKER) {
            return Some(ScriptKind::Drained);
        }
        let rest = head.strip_prefix(DRAIN_MARKER)?;
        let (cursor, _) = rest.split_once(" */")?;
        cursor.parse().ok().map(|from| ScriptKind::Drain { from })
    }
}

/// Render the detector installer. Evaluates to `true` when it installed
/// listeners and `false` when the guard was already set.
pub fn injection_script(settings: &GestureSettings) -> String {
    INJECT_TEMPLATE
        .replace("__GUARD_GLOBAL__", &js_string(GUARD_GLOBAL))
        .replace("__BUFFER_GLOBAL__", &js_string(BUFFER_GLOBAL))
        .replace("__ATTACHED_FLAG__", &js_string(ATTACHED_FLAG))
        .replace("__NO_EXTRACT__", &js_string(NO_EXTRACT))
        .replace("__NO_SLIDE__", &js_string(NO_SLIDE))
        .replace("__SWIPER_SELECTOR__", &js_string(&settings.swiper_selector))
        .replace(
            "__ACTIVE_SLIDE_SELECTOR__",
            &js_string(&settings.active_slide_selector),
        )
        .replace(
            "__MIN_SWIPE_DISTANCE__",
            &settings.min_swipe_distance.to_string(),
        )
}

/// Slice of the buffer from `cursor` to its end. The page remembers how far
/// it has been drained so a later attach can resume from there.
pub fn drain_expression(cursor: usize) -> String {
    format!(
        "{DRAIN_MARKER}{cursor} */ (function () {{ var logs = window[{buffer}]; if (!logs) {{ return []; }} var slice = logs.slice({cursor}); window[{drained}] = {cursor} + slice.length; return slice; }})()",
        buffer = js_string(BUFFER_GLOBAL),
        drained = js_string(DRAINED_GLOBAL),
    )
}

/// Drain position recorded in the page, capped at the buffer length.
/// Zero when nothing was drained yet.
pub fn drained_expression() -> String {
    format!(
        "{DRAINED_MARKER} (function () {{ var logs = window[{buffer}] || []; return Math.min(window[{drained}] || 0, logs.length); }})()",
        buffer = js_string(BUFFER_GLOBAL),
        drained = js_string(DRAINED_GLOBAL),
    )
}

pub fn clear_expression() -> String {
    format!(
        "{CLEAR_MARKER} (function () {{ if (window[{buffer}]) {{ window[{buffer}] = []; }} window[{drained}] = 0; return true; }})()",
        buffer = js_string(BUFFER_GLOBAL),
        drained = js_string(DRAINED_GLOBAL),
    )
}

pub fn location_expression() -> String {
    format!("{LOCATION_MARKER} window.location.href")
}

fn js_string<T: Serialize + ?Sized>(value: &T) -> String {
    // A JSON string literal is a valid JS string literal.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_script_has_no_placeholders_left() {
        let script = injection_script(&GestureSettings::default());
        assert!(!script.contains("__GUARD_GLOBAL__"));
        assert!(!script.contains("__MIN_SWIPE_DISTANCE__"));
        assert!(script.contains("\"[data-testid=\\\"swiper\\\"]\""));
        assert!(script.contains("var MIN_SWIPE_DISTANCE = 50;"));
        assert_eq!(ScriptKind::classify(&script), Some(ScriptKind::Inject));
    }

    #[test]
    fn drain_expression_round_trips_cursor() {
        let expression = drain_expression(17);
        assert!(expression.contains("slice(17)"));
        assert!(expression.contains("[\"__imgAuditDrained\"] = 17 + slice.length"));
        assert_eq!(
            ScriptKind::classify(&expression),
            Some(ScriptKind::Drain { from: 17 })
        );
    }

    #[test]
    fn clear_and_location_classify() {
        assert_eq!(
            ScriptKind::classify(&clear_expression()),
            Some(ScriptKind::Clear)
        );
        assert_eq!(
            ScriptKind::classify(&location_expression()),
            Some(ScriptKind::Location)
        );
        assert_eq!(
            ScriptKind::classify(&drained_expression()),
            Some(ScriptKind::Drained)
        );
        assert_eq!(ScriptKind::classify("1 + 1"), None);
    }
}
