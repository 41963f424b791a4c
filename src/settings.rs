use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::gesture::DEFAULT_MIN_SWIPE_DISTANCE;

pub const DEFAULT_STORAGE_KEY: &str = "imgAuditLogs";
pub const DEFAULT_API_BASE_URL: &str = "http://content-enricher.taboolasyndication.com:8400";
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    /// Wait after a context invalidation before re-injecting.
    pub stabilize_delay_ms: u64,
    /// Wait after a navigation event before re-injecting.
    pub navigation_delay_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            stabilize_delay_ms: 1000,
            navigation_delay_ms: 500,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stabilize_delay(&self) -> Duration {
        Duration::from_millis(self.stabilize_delay_ms)
    }

    pub fn navigation_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    pub min_swipe_distance: f64,
    pub swiper_selector: String,
    pub active_slide_selector: String,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            min_swipe_distance: DEFAULT_MIN_SWIPE_DISTANCE,
            swiper_selector: r#"[data-testid="swiper"]"#.into(),
            active_slide_selector: ".swiper-slide-active img".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub quality_path: String,
    pub metrics_path: String,
    /// `None` leaves the transport default in place.
    pub timeout_ms: Option<u64>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            quality_path: "/api/images/analyze-quality".into(),
            metrics_path: "/api/images/metrics".into(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeSettings {
    pub debug_port: u16,
    /// Substring of the page URL to attach to; first page when unset.
    pub page_filter: Option<String>,
}

impl Default for ChromeSettings {
    fn default() -> Self {
        Self {
            debug_port: DEFAULT_DEBUG_PORT,
            page_filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub storage_key: String,
    pub poll: PollSettings,
    pub gesture: GestureSettings,
    pub api: ApiSettings,
    pub chrome: ChromeSettings,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.into(),
            poll: PollSettings::default(),
            gesture: GestureSettings::default(),
            api: ApiSettings::default(),
            chrome: ChromeSettings::default(),
        }
    }
}

impl AuditSettings {
    /// Apply `IMGAUDIT_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = std::env::var("IMGAUDIT_API_BASE") {
            if !base.trim().is_empty() {
                self.api.base_url = base.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(port) = std::env::var("IMGAUDIT_DEBUG_PORT") {
            match port.trim().parse() {
                Ok(port) => self.chrome.debug_port = port,
                Err(err) => warn!("Ignoring IMGAUDIT_DEBUG_PORT={port:?}: {err}"),
            }
        }
        self
    }
}

/// JSON-file backed settings, created with defaults on first run.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AuditSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Settings at {} are invalid ({err}); using defaults",
                    path.display()
                );
                AuditSettings::default()
            })
        } else {
            let defaults = AuditSettings::default();
            persist_to(&path, &defaults)?;
            defaults
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File values with environment overrides applied.
    pub fn effective(&self) -> AuditSettings {
        self.read().clone().with_env_overrides()
    }

    pub fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AuditSettings),
    {
        let mut guard = self.write();
        apply(&mut guard);
        persist_to(&self.path, &guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, AuditSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuditSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist_to(path: &Path, data: &AuditSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}
