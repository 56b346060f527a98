// src/worker.rs

use crate::error::PrintError;
use log::{debug, trace, warn};
use quire_engine::EngineLease;
use quire_traits::{EngineError, RenderContext};
use quire_types::{ContentItem, PrintOptions, RenderedPage, viewport_for};
use std::sync::Arc;
use std::time::Instant;

/// Renders one content item in its own context.
///
/// The lease keeps the engine alive for as long as this task runs, even if
/// the request that spawned it has already given up. The context is closed
/// on every path.
pub(crate) async fn render_item(
    engine: Arc<EngineLease>,
    index: usize,
    item: ContentItem,
    options: Arc<PrintOptions>,
) -> Result<RenderedPage, PrintError> {
    let start = Instant::now();
    let mut context = engine
        .new_context()
        .await
        .map_err(|e| PrintError::from(e).in_item(index))?;

    let result = capture(index, context.as_mut(), &item, &options).await;

    if let Err(e) = context.close().await {
        warn!("[ITEM-{}] Failed to close rendering context: {}", index, e);
    }

    match result {
        Ok(bytes) => {
            debug!(
                "[ITEM-{}] Rendered {} bytes in {:?}",
                index,
                bytes.len(),
                start.elapsed()
            );
            Ok(RenderedPage { index, bytes })
        }
        Err(e) => {
            debug!("[ITEM-{}] Failed after {:?}: {}", index, start.elapsed(), e);
            Err(PrintError::from(e).in_item(index))
        }
    }
}

async fn capture(
    index: usize,
    context: &mut dyn RenderContext,
    item: &ContentItem,
    options: &PrintOptions,
) -> Result<Vec<u8>, EngineError> {
    if options.fit_content {
        let viewport = viewport_for(options.format, options.landscape);
        trace!("[ITEM-{}] Viewport {}x{}", index, viewport.width, viewport.height);
        context.set_viewport(viewport).await?;
    }

    match options.timeout() {
        Some(limit) => tokio::time::timeout(limit, context.load(item, Some(limit)))
            .await
            .map_err(|_| EngineError::Timeout(limit))??,
        None => context.load(item, None).await?,
    }

    let setup = if options.fit_content {
        let content = context.measure_content().await?;
        trace!(
            "[ITEM-{}] Content box {}x{}",
            index, content.width, content.height
        );
        options.fitted_page_setup(content)
    } else {
        options.page_setup()
    };

    context.print_pdf(&setup).await
}
