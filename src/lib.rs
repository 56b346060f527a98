//! Markup and URL to PDF printing through one shared headless browser.
//!
//! A [`Printer`] takes a [`RenderRequest`] (an ordered list of markup
//! documents or URLs plus print options), renders every item concurrently in
//! its own browser context and merges the resulting PDFs in input order.
//!
//! The browser itself is owned by a [`SharedEngine`]: it is launched on first
//! demand, shared by every request in flight and shut down after a period
//! without demand.
//!
//! ```ignore
//! use quire::{ChromeConfig, ChromeLauncher, Printer, PrintOptions, SharedEngine};
//! use std::sync::Arc;
//!
//! let engine = SharedEngine::with_defaults(Arc::new(ChromeLauncher::new(ChromeConfig::default())));
//! let printer = Printer::new(engine);
//! let pdf = printer
//!     .print_markup(["<h1>Hello</h1>"], PrintOptions::default())
//!     .await?;
//! ```

pub mod error;
pub mod printer;
mod worker;

pub use error::PrintError;
pub use printer::Printer;

pub use quire_engine::{
    DEFAULT_IDLE_TIMEOUT, EngineLease, EnginePhase, EngineStatus, SharedEngine,
};
#[cfg(feature = "chrome")]
pub use quire_engine::{ChromeConfig, ChromeLauncher};
pub use quire_traits::{Engine, EngineError, EngineLauncher, RenderContext};
pub use quire_types::{
    ContentBox, ContentItem, ContentKind, DocumentInfo, Length, Margins, PageSetup, PageSize,
    PaperFormat, PrintOptions, RenderRequest, RenderedPage, Viewport, viewport_for,
};
