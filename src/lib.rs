pub mod analysis;
pub mod bridge;
pub mod cli;
pub mod db;
pub mod decoder;
pub mod export;
pub mod gesture;
pub mod models;
pub mod panel;
pub mod session;
pub mod settings;
pub mod store;
mod utils;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};

use analysis::AnalysisClient;
use bridge::{CdpPage, InspectedPage, SimulatedPage};
use cli::{Cli, Command, SimulateArgs, WatchArgs};
use db::Database;
use decoder::decode_image_url;
use export::ExportError;
use gesture::TouchPoint;
use panel::{needs_analysis, render_entry, render_results, Panel};
use session::LiveSession;
use settings::{AuditSettings, SettingsStore};
use store::LogStore;

pub use utils::init_logging;

const DATA_DIR_ENV: &str = "IMGAUDIT_DATA_DIR";
const DB_FILE: &str = "imgaudit.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const SIMULATED_KEY_SUFFIX: &str = ".simulate";
const CHROME_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SIMULATED_SLIDE: &str =
    "https://cdn.example.com/fit-in/1200x0/https%3A%2F%2Fimages.example.org%2Fgallery%2Fslide-1.jpg";

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    if let Command::Decode { url } = &cli.command {
        let decoded = decode_image_url(Some(url));
        println!("{}", serde_json::to_string_pretty(&decoded)?);
        return Ok(());
    }

    let data_dir = resolve_data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    info!("Using data directory {}", data_dir.display());

    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    let db = Database::new(data_dir.join(DB_FILE))?;

    match cli.command {
        Command::Watch(args) => watch(&settings_store, db, args).await,
        Command::Simulate(args) => simulate(settings_store.effective(), db, args).await,
        Command::List => {
            let store = open_store(&settings_store, db);
            let entries = store.get_all().await;
            if entries.is_empty() {
                println!("No logs yet");
            }
            for entry in entries.iter().rev() {
                println!("{}\n", render_entry(entry));
            }
            Ok(())
        }
        Command::Approve { id } => set_qa(open_store(&settings_store, db), &id, true).await,
        Command::Unapprove { id } => set_qa(open_store(&settings_store, db), &id, false).await,
        Command::Analyze { id } => analyze(&settings_store.effective(), db, id).await,
        Command::Export { out } => {
            let panel = Panel::new(open_store(&settings_store, db));
            let dir = match out {
                Some(dir) => dir,
                None => env::current_dir().context("failed to resolve current directory")?,
            };
            match panel.export(&dir).await {
                Ok(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                Err(ExportError::NoLogs) => {
                    println!("{}", ExportError::NoLogs);
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
        Command::Clear => {
            let settings = settings_store.effective();
            let mut panel = Panel::new(LogStore::new(db, &settings.storage_key));
            if let Some(page) = connect_if_reachable(&settings).await {
                panel = panel.with_page(page);
            }
            panel.clear().await;
            println!("Logs cleared");
            Ok(())
        }
        Command::Decode { .. } => Ok(()),
    }
}

/// `--data-dir`, then `$IMGAUDIT_DATA_DIR`, then the platform data dir.
fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("imgaudit"))
        .ok_or_else(|| anyhow!("no platform data directory; pass --data-dir or set {DATA_DIR_ENV}"))
}

fn open_store(settings_store: &SettingsStore, db: Database) -> LogStore {
    LogStore::new(db, &settings_store.effective().storage_key)
}

fn apply_watch_args(settings: &mut AuditSettings, args: &WatchArgs) {
    if let Some(port) = args.port {
        settings.chrome.debug_port = port;
    }
    if let Some(filter) = &args.page {
        settings.chrome.page_filter = Some(filter.clone());
    }
    if let Some(base) = &args.api_base {
        settings.api.base_url = base.trim_end_matches('/').to_string();
    }
}

/// Attach to the configured Chrome page, or `None` when Chrome is not
/// running with remote debugging.
async fn connect_if_reachable(settings: &AuditSettings) -> Option<Arc<dyn InspectedPage>> {
    let connect = CdpPage::connect(
        settings.chrome.debug_port,
        settings.chrome.page_filter.as_deref(),
    );
    match tokio::time::timeout(CHROME_CONNECT_TIMEOUT, connect).await {
        Ok(Ok(page)) => {
            let page: Arc<dyn InspectedPage> = Arc::new(page);
            Some(page)
        }
        Ok(Err(err)) => {
            warn!("Chrome not reachable ({err:#}); in-page buffer left as is");
            None
        }
        Err(_) => {
            warn!("Timed out connecting to Chrome; in-page buffer left as is");
            None
        }
    }
}

async fn watch(settings_store: &SettingsStore, db: Database, args: WatchArgs) -> Result<()> {
    if args.save {
        settings_store.update(|settings| apply_watch_args(settings, &args))?;
        info!("Saved options to {}", settings_store.path().display());
    }
    let mut settings = settings_store.effective();
    apply_watch_args(&mut settings, &args);

    let page = CdpPage::connect(
        settings.chrome.debug_port,
        settings.chrome.page_filter.as_deref(),
    )
    .await?;
    let page: Arc<dyn InspectedPage> = Arc::new(page);

    let store = LogStore::new(db, &settings.storage_key);
    let analyzer = Arc::new(AnalysisClient::new(&settings.api)?);
    let session = LiveSession::start(page, store, Some(analyzer), &settings).await?;

    println!("Watching for swipes. Press Ctrl-C to stop.\n");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    session.shutdown().await
}

/// Drive the live pipeline against an in-memory page. Entries go under a
/// separate storage key so the real log is untouched.
async fn simulate(settings: AuditSettings, db: Database, args: SimulateArgs) -> Result<()> {
    let sources = if args.sources.is_empty() {
        vec![SIMULATED_SLIDE.to_string()]
    } else {
        args.sources
    };

    let page = Arc::new(SimulatedPage::new(&args.url, &settings.gesture));
    page.mount_carousel("swiper");
    page.set_active_slide(sources.first().map(String::as_str));

    let store = LogStore::new(db, &format!("{}{SIMULATED_KEY_SUFFIX}", settings.storage_key));
    let analyzer = if args.offline {
        None
    } else {
        Some(Arc::new(AnalysisClient::new(&settings.api)?))
    };
    let session = LiveSession::start(page.clone(), store, analyzer, &settings).await?;

    // Let the initial injection land before swiping.
    tokio::time::sleep(settings.poll.interval()).await;
    let travel = settings.gesture.min_swipe_distance * 2.0 + 1.0;
    for n in 0..args.swipes {
        page.set_active_slide(Some(sources[n % sources.len()].as_str()));
        let recorded = page.swipe(
            "swiper",
            TouchPoint::new(travel, 0.0),
            TouchPoint::new(0.0, 0.0),
        );
        if !recorded {
            warn!("Simulated swipe {n} was not recorded");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // One more cycle so the last swipes are drained.
    tokio::time::sleep(settings.poll.interval() * 2).await;
    session.finish().await
}

async fn set_qa(store: LogStore, id: &str, approved: bool) -> Result<()> {
    let panel = Panel::new(store);
    if !panel.set_qa(id, approved).await {
        bail!("no log entry with id {id}");
    }
    println!("{id}: QA {}", if approved { "approved" } else { "cleared" });
    Ok(())
}

async fn analyze(settings: &AuditSettings, db: Database, id: Option<String>) -> Result<()> {
    let store = LogStore::new(db, &settings.storage_key);
    let panel = Panel::new(store.clone()).with_analyzer(Arc::new(AnalysisClient::new(&settings.api)?));

    let ids: Vec<String> = match id {
        Some(id) => vec![id],
        None => store
            .get_all()
            .await
            .into_iter()
            .filter(needs_analysis)
            .map(|entry| entry.id)
            .collect(),
    };
    if ids.is_empty() {
        println!("Nothing to analyze");
        return Ok(());
    }

    for id in ids {
        match panel.analyze_entry(&id).await {
            Some(results) => println!("[{id}] results\n{}", render_results(&results)),
            None => println!("[{id}] skipped (missing, already analyzed, or no valid URL)"),
        }
    }
    Ok(())
}
