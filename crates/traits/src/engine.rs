//! Traits abstracting the external rendering engine.
//!
//! The print pipeline only ever talks to these traits, so a real browser and
//! an in-process fake are interchangeable:
//!
//! - [`EngineLauncher`] starts one engine instance (the expensive part).
//! - [`Engine`] is a live instance that hands out isolated contexts.
//! - [`RenderContext`] loads one document and prints it.

use async_trait::async_trait;
use quire_types::{ContentBox, ContentItem, PageSetup, Viewport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for engine operations.
///
/// `Clone` so a single launch outcome can be handed to every caller waiting
/// on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to launch rendering engine: {0}")]
    Launch(String),

    /// Navigation or rendering failure reported by the engine itself.
    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Loading content timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rendering engine is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn launch(message: impl Into<String>) -> Self {
        EngineError::Launch(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        EngineError::Protocol(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        EngineError::Other(message.into())
    }

    /// Whether the failure was caused by the content being rendered rather
    /// than by the engine or the host.
    pub fn is_content_error(&self) -> bool {
        matches!(self, EngineError::Protocol(_) | EngineError::Timeout(_))
    }
}

/// Starts rendering engine instances.
///
/// # Implementations
///
/// - `ChromeLauncher`: headless Chromium (feature `chrome` of `quire-engine`)
/// - `MockLauncher`: in-process fake (feature `test-utils` of `quire-engine`)
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Launch a new engine instance. Called at most once per activation
    /// period by the resource manager.
    async fn launch(&self) -> Result<Arc<dyn Engine>, EngineError>;
}

/// A live engine instance.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create a fresh isolated rendering context. Contexts never share
    /// cookies, storage or loaded content with each other.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, EngineError>;

    /// Shut the instance down. Called once, after the last consumer left and
    /// the idle timeout expired.
    async fn close(&self) -> Result<(), EngineError>;
}

/// One isolated session inside an engine instance, used for exactly one
/// content item.
#[async_trait]
pub trait RenderContext: Send {
    /// Resize the layout viewport. Must be called before [`load`](Self::load)
    /// to influence the initial layout.
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), EngineError>;

    /// Inject markup or navigate to a URL, then wait until network activity
    /// settles.
    async fn load(
        &mut self,
        item: &ContentItem,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError>;

    /// Measure the rendered content's bounding box.
    async fn measure_content(&mut self) -> Result<ContentBox, EngineError>;

    /// Print the loaded content to a PDF byte buffer.
    async fn print_pdf(&mut self, setup: &PageSetup) -> Result<Vec<u8>, EngineError>;

    /// Dispose of the context and everything loaded into it.
    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
