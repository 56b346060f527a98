//! Headless Chromium as a rendering engine.
//!
//! The `headless_chrome` driver is synchronous; every call into it runs on
//! tokio's blocking pool so the async pipeline never stalls on the DevTools
//! socket.
//!
//! Each [`RenderContext`] is a fresh browser context (incognito-like, no
//! shared cookies or storage) with a single tab. Closing the context disposes
//! the browser context and everything loaded in it. Browser-level commands go
//! through the initial tab of the default context, which lives as long as
//! the browser.

use async_trait::async_trait;
use headless_chrome::browser::tab::EventListener;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{DOM, Emulation, Network, Page, Target};
use headless_chrome::types::{Bounds, PrintToPdfOptions};
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use quire_traits::{Engine, EngineError, EngineLauncher, RenderContext};
use quire_types::{ContentBox, ContentItem, ContentKind, PageSetup, Viewport};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Flags passed to the browser unless configured otherwise.
pub const DEFAULT_ARGS: &str = "--disable-web-security --no-sandbox --disable-setuid-sandbox";

/// Binaries looked up on `PATH`, in order, when no executable is configured.
pub const EXECUTABLE_CANDIDATES: &[&str] = &[
    "chrome-headless-shell",
    "chromium",
    "chromium-browser",
    "google-chrome-stable",
    "google-chrome",
];

/// Load bound used when the caller sets no timeout.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const NETWORK_QUIET_PERIOD: Duration = Duration::from_millis(500);
const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(100);
// The driver drops its DevTools connection after this long without events;
// teardown is owned by the resource manager instead.
const DRIVER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

const DOCUMENT_COMPLETE: &str = "document.readyState === 'complete'";
const FONTS_READY: &str = "document.fonts.ready.then(() => true)";

const MEASURE_CONTENT: &str = "JSON.stringify((() => { \
    const body = document.body; \
    const html = document.documentElement; \
    return { \
        widths: [body ? body.scrollWidth : 0, body ? body.offsetWidth : 0, \
                 html.clientWidth, html.scrollWidth, html.offsetWidth], \
        heights: [body ? body.scrollHeight : 0, body ? body.offsetHeight : 0, \
                  html.clientHeight, html.scrollHeight, html.offsetHeight] \
    }; })())";

#[derive(Debug, Clone, PartialEq)]
pub struct ChromeConfig {
    /// Browser binary; searched on `PATH` when unset.
    pub executable: Option<PathBuf>,
    /// Whitespace-separated command-line flags.
    pub args: String,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            args: DEFAULT_ARGS.to_string(),
        }
    }
}

impl ChromeConfig {
    pub fn args(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }

    /// The configured executable, or the first candidate found on `PATH`.
    pub fn resolve_executable(&self) -> Result<PathBuf, EngineError> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }
        let path_var = env::var_os("PATH").unwrap_or_default();
        let dirs: Vec<PathBuf> = env::split_paths(&path_var).collect();
        find_executable(EXECUTABLE_CANDIDATES, &dirs).ok_or_else(|| {
            EngineError::launch(format!(
                "no browser executable configured and none of {} found on PATH",
                EXECUTABLE_CANDIDATES.join(", ")
            ))
        })
    }
}

fn find_executable(candidates: &[&str], dirs: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run a blocking driver call on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| EngineError::other(format!("browser task failed: {e}")))?
}

pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError> {
        let config = self.config.clone();
        let running = blocking(move || {
            let executable = config.resolve_executable()?;
            let args = config.args();
            info!(
                "Starting browser {} with flags {:?}",
                executable.display(),
                args
            );
            let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(!args.contains(&"--no-sandbox"))
                .path(Some(executable))
                .args(os_args)
                .idle_browser_timeout(DRIVER_IDLE_TIMEOUT)
                .build()
                .map_err(|e| EngineError::launch(e.to_string()))?;
            let browser = Browser::new(options).map_err(|e| EngineError::launch(e.to_string()))?;
            let control = browser
                .wait_for_initial_tab()
                .map_err(|e| EngineError::launch(format!("waiting for initial tab: {e}")))?;
            Ok(Running {
                browser: Arc::new(browser),
                control,
            })
        })
        .await?;

        Ok(Arc::new(ChromeEngine {
            running: Mutex::new(Some(running)),
        }))
    }
}

#[derive(Clone)]
struct Running {
    browser: Arc<Browser>,
    /// Tab in the default context, used for browser-level commands.
    control: Arc<Tab>,
}

pub struct ChromeEngine {
    running: Mutex<Option<Running>>,
}

impl ChromeEngine {
    fn running(&self) -> Result<Running, EngineError> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::Closed)
    }
}

#[async_trait]
impl Engine for ChromeEngine {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, EngineError> {
        let Running { browser, control } = self.running()?;
        let (context_id, tab) = blocking(move || {
            let context = browser
                .new_context()
                .map_err(|e| EngineError::protocol(format!("creating browser context: {e}")))?;
            let tab = context
                .new_tab()
                .map_err(|e| EngineError::protocol(format!("opening tab: {e}")))?;
            Ok((context.get_id().to_string(), tab))
        })
        .await?;
        debug!("Opened browser context {}", context_id);

        Ok(Box::new(ChromeContext {
            control,
            context_id,
            tab,
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            // Dropping the last handle terminates the browser process.
            blocking(move || {
                drop(running);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct Extents {
    widths: Vec<f64>,
    heights: Vec<f64>,
}

fn evaluate_json<T: for<'de> Deserialize<'de>>(tab: &Tab, script: &str) -> Result<T, EngineError> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| EngineError::protocol(e.to_string()))?;
    let text = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::protocol("script returned no value"))?;
    serde_json::from_str(text).map_err(|e| EngineError::other(format!("bad script result: {e}")))
}

fn document_complete(tab: &Tab) -> Result<bool, EngineError> {
    let result = tab
        .evaluate(DOCUMENT_COMPLETE, false)
        .map_err(|e| EngineError::protocol(e.to_string()))?;
    Ok(result.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(false))
}

/// Requests the page has started but not yet finished or failed.
#[derive(Debug)]
struct NetworkActivity {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_change: now,
        }
    }

    fn started(&mut self, request_id: &str, now: Instant) {
        // Redirects reuse the request id.
        self.in_flight.insert(request_id.to_string());
        self.last_change = now;
    }

    fn settled(&mut self, request_id: &str, now: Instant) {
        if self.in_flight.remove(request_id) {
            self.last_change = now;
        }
    }

    fn record(&mut self, event: &Event, now: Instant) {
        match event {
            Event::NetworkRequestWillBeSent(e) => self.started(&e.params.request_id, now),
            Event::NetworkLoadingFinished(e) => self.settled(&e.params.request_id, now),
            Event::NetworkLoadingFailed(e) => self.settled(&e.params.request_id, now),
            _ => {}
        }
    }

    /// Nothing in flight, and nothing started or settled, for
    /// [`NETWORK_QUIET_PERIOD`].
    fn is_idle(&self, now: Instant) -> bool {
        self.in_flight.is_empty()
            && now.saturating_duration_since(self.last_change) >= NETWORK_QUIET_PERIOD
    }
}

type Listener = dyn EventListener<Event> + Send + Sync;

/// Tracks a tab's network activity from before a load starts until dropped.
struct NetworkWatch<'a> {
    tab: &'a Tab,
    activity: Arc<Mutex<NetworkActivity>>,
    listener: Weak<Listener>,
}

impl<'a> NetworkWatch<'a> {
    fn start(tab: &'a Tab) -> Result<Self, EngineError> {
        tab.call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            report_direct_socket_traffic: None,
            enable_durable_messages: None,
        })
        .map_err(|e| EngineError::protocol(format!("enabling network events: {e}")))?;

        let activity = Arc::new(Mutex::new(NetworkActivity::new(Instant::now())));
        let sink = Arc::clone(&activity);
        let listener = tab
            .add_event_listener(Arc::new(move |event: &Event| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(event, Instant::now());
            }))
            .map_err(|e| EngineError::protocol(format!("watching network events: {e}")))?;

        Ok(Self {
            tab,
            activity,
            listener,
        })
    }

    /// Blocks until the document is complete and the network has been idle
    /// for [`NETWORK_QUIET_PERIOD`].
    fn wait_until_idle(&self, deadline: Instant, budget: Duration) -> Result<(), EngineError> {
        loop {
            let now = Instant::now();
            let idle = self
                .activity
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_idle(now);
            if idle && document_complete(self.tab)? {
                return Ok(());
            }
            if now >= deadline {
                return Err(EngineError::Timeout(budget));
            }
            std::thread::sleep(NETWORK_POLL_INTERVAL);
        }
    }
}

impl Drop for NetworkWatch<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tab.remove_event_listener(&self.listener) {
            debug!("Failed to remove network listener: {}", e);
        }
    }
}

/// How an item gets into the tab.
#[derive(Debug, PartialEq)]
enum LoadTarget<'a> {
    /// Navigate the tab to a URL.
    Navigate(&'a str),
    /// Write markup into the tab's current `about:blank` document.
    Inject(&'a str),
}

fn load_target(item: &ContentItem) -> LoadTarget<'_> {
    match item.kind {
        ContentKind::Url => LoadTarget::Navigate(&item.content),
        ContentKind::Markup => LoadTarget::Inject(&item.content),
    }
}

fn load_budget(timeout: Option<Duration>) -> Duration {
    timeout.unwrap_or(DEFAULT_LOAD_TIMEOUT)
}

fn inject_command(frame_id: String, markup: &str) -> Page::SetDocumentContent {
    Page::SetDocumentContent {
        frame_id,
        html: markup.to_string(),
    }
}

fn main_frame_id(tab: &Tab) -> Result<String, EngineError> {
    tab.call_method(Page::GetFrameTree(None))
        .map(|tree| tree.frame_tree.frame.id)
        .map_err(|e| EngineError::protocol(format!("reading frame tree: {e}")))
}

fn load_error(error: impl Display, deadline: Instant, budget: Duration) -> EngineError {
    if Instant::now() >= deadline {
        EngineError::Timeout(budget)
    } else {
        EngineError::protocol(error.to_string())
    }
}

fn load_blocking(tab: &Tab, item: &ContentItem, timeout: Option<Duration>) -> Result<(), EngineError> {
    let budget = load_budget(timeout);
    let deadline = Instant::now() + budget;
    tab.set_default_timeout(budget);

    let watch = NetworkWatch::start(tab)?;
    match load_target(item) {
        LoadTarget::Navigate(url) => {
            tab.navigate_to(url)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| load_error(e, deadline, budget))?;
        }
        LoadTarget::Inject(markup) => {
            let frame_id = main_frame_id(tab)?;
            tab.call_method(inject_command(frame_id, markup))
                .map_err(|e| load_error(e, deadline, budget))?;
        }
    }
    watch.wait_until_idle(deadline, budget)
}

fn transparent_background() -> Emulation::SetDefaultBackgroundColorOverride {
    Emulation::SetDefaultBackgroundColorOverride {
        color: Some(DOM::RGBA {
            r: 0,
            g: 0,
            b: 0,
            a: Some(0.0),
        }),
    }
}

fn dispose_command(context_id: &str) -> Target::DisposeBrowserContext {
    Target::DisposeBrowserContext {
        browser_context_id: context_id.to_string(),
    }
}

fn pdf_options(setup: &PageSetup) -> PrintToPdfOptions {
    let (paper_width, paper_height) = setup.size.paper_inches();
    PrintToPdfOptions {
        landscape: Some(setup.size.is_landscape()),
        display_header_footer: Some(setup.display_header_footer),
        print_background: Some(setup.print_background),
        scale: Some(setup.scale),
        paper_width: Some(paper_width),
        paper_height: Some(paper_height),
        margin_top: Some(setup.margin.top.to_inches()),
        margin_bottom: Some(setup.margin.bottom.to_inches()),
        margin_left: Some(setup.margin.left.to_inches()),
        margin_right: Some(setup.margin.right.to_inches()),
        page_ranges: setup.page_ranges.clone(),
        header_template: setup.header_template.clone(),
        footer_template: setup.footer_template.clone(),
        prefer_css_page_size: Some(setup.prefer_css_page_size),
        generate_document_outline: Some(setup.outline),
        generate_tagged_pdf: Some(setup.tagged),
        ..Default::default()
    }
}

pub struct ChromeContext {
    control: Arc<Tab>,
    context_id: String,
    tab: Arc<Tab>,
}

#[async_trait]
impl RenderContext for ChromeContext {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), EngineError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(f64::from(viewport.width)),
                height: Some(f64::from(viewport.height)),
            })
            .map_err(|e| EngineError::protocol(format!("resizing viewport: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn load(
        &mut self,
        item: &ContentItem,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        let tab = Arc::clone(&self.tab);
        let item = item.clone();
        blocking(move || load_blocking(&tab, &item, timeout)).await
    }

    async fn measure_content(&mut self) -> Result<ContentBox, EngineError> {
        let tab = Arc::clone(&self.tab);
        let extents: Extents = blocking(move || evaluate_json(&tab, MEASURE_CONTENT)).await?;
        Ok(ContentBox::from_extents(&extents.widths, &extents.heights))
    }

    async fn print_pdf(&mut self, setup: &PageSetup) -> Result<Vec<u8>, EngineError> {
        let tab = Arc::clone(&self.tab);
        let options = pdf_options(setup);
        let wait_for_fonts = setup.wait_for_fonts;
        let omit_background = setup.omit_background;
        blocking(move || {
            if wait_for_fonts {
                tab.evaluate(FONTS_READY, true)
                    .map_err(|e| EngineError::protocol(format!("waiting for fonts: {e}")))?;
            }
            if omit_background {
                tab.call_method(transparent_background())
                    .map_err(|e| EngineError::protocol(format!("clearing background: {e}")))?;
            }
            tab.print_to_pdf(Some(options))
                .map_err(|e| EngineError::protocol(format!("printing: {e}")))
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        let ChromeContext {
            control,
            context_id,
            tab,
        } = *self;
        blocking(move || {
            if let Err(e) = tab.close(true) {
                warn!("Failed to close tab in context {}: {}", context_id, e);
            }
            control
                .call_method(dispose_command(&context_id))
                .map_err(|e| {
                    EngineError::protocol(format!("disposing context {context_id}: {e}"))
                })?;
            debug!("Disposed browser context {}", context_id);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_types::{Length, Margins, PaperFormat, PrintOptions};

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn default_flags_disable_the_sandbox() {
        let config = ChromeConfig::default();
        assert_eq!(
            config.args(),
            vec!["--disable-web-security", "--no-sandbox", "--disable-setuid-sandbox"]
        );
    }

    #[test]
    fn explicit_executable_wins() {
        let config = ChromeConfig {
            executable: Some(PathBuf::from("/opt/chrome/chrome")),
            ..ChromeConfig::default()
        };
        assert_eq!(
            config.resolve_executable().unwrap(),
            PathBuf::from("/opt/chrome/chrome")
        );
    }

    #[test]
    fn missing_candidates_are_not_found() {
        let dirs = vec![PathBuf::from("/nonexistent-quire-dir")];
        assert_eq!(find_executable(EXECUTABLE_CANDIDATES, &dirs), None);
    }

    #[test]
    fn named_setup_maps_to_portrait_paper_and_landscape_flag() {
        let options = PrintOptions {
            format: PaperFormat::Letter,
            landscape: true,
            margin: Margins::all(Length::In(0.5)),
            page_ranges: Some("1-2".to_string()),
            ..PrintOptions::default()
        };
        let pdf = pdf_options(&options.page_setup());
        assert_eq!(pdf.landscape, Some(true));
        assert_eq!(pdf.paper_width, Some(8.5));
        assert_eq!(pdf.paper_height, Some(11.0));
        assert_eq!(pdf.margin_left, Some(0.5));
        assert_eq!(pdf.page_ranges.as_deref(), Some("1-2"));
    }

    #[test]
    fn fitted_setup_uses_exact_size_without_margins() {
        let options = PrintOptions {
            margin: Margins::all(Length::Px(40.0)),
            ..PrintOptions::default()
        };
        let pdf = pdf_options(&options.fitted_page_setup(ContentBox {
            width: 960.0,
            height: 1920.0,
        }));
        assert_eq!(pdf.landscape, Some(false));
        assert_eq!(pdf.paper_width, Some(10.0));
        assert_eq!(pdf.paper_height, Some(20.0));
        assert_eq!(pdf.margin_top, Some(0.0));
    }

    #[test]
    fn print_flags_reach_the_capture_options() {
        let options = PrintOptions {
            outline: true,
            tagged: true,
            width: Some(Length::In(4.0)),
            height: Some(Length::In(6.0)),
            ..PrintOptions::default()
        };
        let pdf = pdf_options(&options.page_setup());
        assert_eq!(pdf.generate_document_outline, Some(true));
        assert_eq!(pdf.generate_tagged_pdf, Some(true));
        assert_eq!(pdf.paper_width, Some(4.0));
        assert_eq!(pdf.paper_height, Some(6.0));
    }

    #[test]
    fn large_markup_is_injected_not_navigated() {
        let markup = format!("<p>{}</p>", "x".repeat(3 * 1024 * 1024));
        let item = ContentItem::markup(markup.clone());

        assert_eq!(load_target(&item), LoadTarget::Inject(markup.as_str()));
        let command = inject_command("main".to_string(), &markup);
        assert_eq!(command.frame_id, "main");
        assert_eq!(command.html.len(), markup.len());
    }

    #[test]
    fn urls_are_navigated() {
        let item = ContentItem::url("https://example.com/report");
        assert_eq!(
            load_target(&item),
            LoadTarget::Navigate("https://example.com/report")
        );
    }

    #[test]
    fn loads_without_timeout_are_bounded() {
        assert_eq!(load_budget(None), DEFAULT_LOAD_TIMEOUT);
        assert_eq!(load_budget(Some(5 * MS)), 5 * MS);
    }

    #[test]
    fn pending_request_keeps_network_busy() {
        let start = Instant::now();
        let mut activity = NetworkActivity::new(start);
        activity.started("1", start);
        activity.started("2", start);
        activity.settled("1", start + 100 * MS);

        // A slow fetch is still running long after everything else finished.
        assert!(!activity.is_idle(start + 2000 * MS));

        activity.settled("2", start + 2000 * MS);
        assert!(!activity.is_idle(start + 2400 * MS));
        assert!(activity.is_idle(start + 2500 * MS));
    }

    #[test]
    fn redirects_and_unknown_completions_do_not_skew_the_count() {
        let start = Instant::now();
        let mut activity = NetworkActivity::new(start);
        activity.started("7", start);
        activity.started("7", start + 10 * MS);
        activity.settled("unknown", start + 900 * MS);
        assert!(!activity.is_idle(start + 1000 * MS));

        activity.settled("7", start + 1000 * MS);
        assert!(activity.is_idle(start + 1500 * MS));
    }

    #[test]
    fn quiet_page_is_idle_after_the_quiet_period() {
        let start = Instant::now();
        let activity = NetworkActivity::new(start);
        assert!(!activity.is_idle(start + 499 * MS));
        assert!(activity.is_idle(start + NETWORK_QUIET_PERIOD));
    }

    #[test]
    fn disposal_targets_the_item_context() {
        let command = dispose_command("ctx-42");
        assert_eq!(command.browser_context_id, "ctx-42");
    }

    #[test]
    fn omitted_background_is_fully_transparent() {
        let command = transparent_background();
        let color = command.color.unwrap();
        assert_eq!(color.a, Some(0.0));
    }
}
