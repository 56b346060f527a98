//! An in-process engine for tests.
//!
//! [`MockLauncher`] behaves like a browser from the pipeline's point of view:
//! every context loads one document and prints a real PDF whose pages carry
//! the document's text. A shared [`MockProbe`] records launches, closes and
//! every capture request so tests can assert on the engine lifecycle.
//!
//! - Markup is split into pages at [`PAGE_BREAK`]; tags are stripped.
//! - A URL prints one page containing the URL. URLs under the reserved
//!   `.invalid` TLD, or under a host registered with
//!   [`MockLauncher::with_unreachable_host`], fail to navigate.
//! - The measured content box is the viewport width by 20px per text line.
//!   A document opening with `<!doctype html>` renders in standards mode,
//!   where the root element's client height is the viewport height, so its
//!   content box is never shorter than the viewport.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use quire_traits::{Engine, EngineError, EngineLauncher, RenderContext};
use quire_types::geometry::PT_PER_INCH;
use quire_types::{ContentBox, ContentItem, ContentKind, PageSetup, Viewport};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const PAGE_BREAK: &str = "<!--pagebreak-->";
pub const LINE_HEIGHT_PX: f64 = 20.0;
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 800,
    height: 600,
};

/// Counters and recordings shared by a launcher and everything it creates.
#[derive(Debug, Default)]
pub struct MockProbe {
    launches: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    viewports: Mutex<Vec<Viewport>>,
    setups: Mutex<Vec<PageSetup>>,
}

impl MockProbe {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Highest number of engine instances alive at the same time.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn contexts_opened(&self) -> usize {
        self.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.viewports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn page_setups(&self) -> Vec<PageSetup> {
        self.setups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, Default)]
struct Behaviour {
    launch_delay: Duration,
    close_delay: Duration,
    load_delay: Duration,
    failing_close: bool,
    unreachable_hosts: Vec<String>,
}

impl Behaviour {
    fn is_unreachable(&self, url: &str) -> bool {
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split(['/', ':', '?', '#'])
            .next()
            .unwrap_or_default();
        host.ends_with(".invalid") || self.unreachable_hosts.iter().any(|h| h == host)
    }
}

pub struct MockLauncher {
    behaviour: Behaviour,
    failures_left: AtomicUsize,
    probe: Arc<MockProbe>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            behaviour: Behaviour::default(),
            failures_left: AtomicUsize::new(0),
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.behaviour.launch_delay = delay;
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.behaviour.close_delay = delay;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.behaviour.load_delay = delay;
        self
    }

    /// Make the next `count` launches fail.
    pub fn failing_launches(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Make every engine close report an error (the instance still goes away).
    pub fn failing_close(mut self) -> Self {
        self.behaviour.failing_close = true;
        self
    }

    pub fn with_unreachable_host(mut self, host: impl Into<String>) -> Self {
        self.behaviour.unreachable_hosts.push(host.into());
        self
    }

    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl EngineLauncher for MockLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError> {
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        if !self.behaviour.launch_delay.is_zero() {
            tokio::time::sleep(self.behaviour.launch_delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::launch("mock engine refused to start"));
        }

        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Arc::new(MockEngine {
            behaviour: Arc::new(self.behaviour.clone()),
            probe: Arc::clone(&self.probe),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MockEngine {
    behaviour: Arc<Behaviour>,
    probe: Arc<MockProbe>,
    closed: AtomicBool,
}

#[async_trait]
impl Engine for MockEngine {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        self.probe.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            behaviour: Arc::clone(&self.behaviour),
            probe: Arc::clone(&self.probe),
            viewport: None,
            pages: Vec::new(),
            standards_mode: false,
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if !self.behaviour.close_delay.is_zero() {
            tokio::time::sleep(self.behaviour.close_delay).await;
        }
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
        if self.behaviour.failing_close {
            return Err(EngineError::other("mock engine did not exit cleanly"));
        }
        Ok(())
    }
}

pub struct MockContext {
    behaviour: Arc<Behaviour>,
    probe: Arc<MockProbe>,
    viewport: Option<Viewport>,
    pages: Vec<String>,
    standards_mode: bool,
}

#[async_trait]
impl RenderContext for MockContext {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), EngineError> {
        self.viewport = Some(viewport);
        self.probe
            .viewports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(viewport);
        Ok(())
    }

    async fn load(
        &mut self,
        item: &ContentItem,
        _timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        if !self.behaviour.load_delay.is_zero() {
            tokio::time::sleep(self.behaviour.load_delay).await;
        }
        self.pages = match item.kind {
            ContentKind::Url if self.behaviour.is_unreachable(&item.content) => {
                return Err(EngineError::protocol(format!(
                    "net::ERR_NAME_NOT_RESOLVED at {}",
                    item.content
                )));
            }
            ContentKind::Url => vec![item.content.clone()],
            ContentKind::Markup => item.content.split(PAGE_BREAK).map(strip_tags).collect(),
        };
        self.standards_mode = item.kind == ContentKind::Markup && has_doctype(&item.content);
        Ok(())
    }

    async fn measure_content(&mut self) -> Result<ContentBox, EngineError> {
        if self.pages.is_empty() {
            return Err(EngineError::other("nothing loaded"));
        }
        let viewport = self.viewport.unwrap_or(DEFAULT_VIEWPORT);
        let lines: usize = self.pages.iter().map(|p| p.lines().count().max(1)).sum();
        let mut heights = vec![lines as f64 * LINE_HEIGHT_PX];
        if self.standards_mode {
            heights.push(f64::from(viewport.height));
        }
        Ok(ContentBox::from_extents(&[f64::from(viewport.width)], &heights))
    }

    async fn print_pdf(&mut self, setup: &PageSetup) -> Result<Vec<u8>, EngineError> {
        if self.pages.is_empty() {
            return Err(EngineError::other("nothing loaded"));
        }
        self.probe
            .setups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(setup.clone());
        let (width_in, height_in) = setup.size.oriented_inches();
        build_pdf(&self.pages, width_in * PT_PER_INCH, height_in * PT_PER_INCH)
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.probe.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn has_doctype(markup: &str) -> bool {
    markup
        .trim_start()
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
}

fn strip_tags(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.trim().to_string()
}

/// Builds a PDF with one page per entry of `pages`, each showing its text.
pub fn build_pdf(pages: &[String], width_pt: f64, height_pt: f64) -> Result<Vec<u8>, EngineError> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![20.into(), Object::Real((height_pt - 32.0) as f32)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| EngineError::other(format!("mock content encoding failed: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width_pt as f32),
                Object::Real(height_pt as f32),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| EngineError::other(format!("mock PDF serialization failed: {e}")))?;
    Ok(bytes)
}
