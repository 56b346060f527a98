// src/printer.rs

use crate::error::PrintError;
use crate::worker;
use log::{debug, info, warn};
use quire_engine::SharedEngine;
use quire_types::{ContentItem, ContentKind, PrintOptions, RenderRequest, RenderedPage};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

type RenderTasks = JoinSet<Result<RenderedPage, PrintError>>;

/// Lets in-flight renders run to completion, closing their contexts, once
/// nobody waits for them any more.
struct Detached(RenderTasks);

impl Drop for Detached {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            debug!("Detaching {} unfinished render task(s)", self.0.len());
        }
        self.0.detach_all();
    }
}

/// Prints content items to PDF through the shared rendering engine.
///
/// Every item of a request renders concurrently in its own isolated context;
/// the resulting documents are merged in input order.
#[derive(Debug, Clone)]
pub struct Printer {
    engine: SharedEngine,
}

impl Printer {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Renders every item and merges the results into one PDF.
    pub async fn print(&self, request: RenderRequest) -> Result<Vec<u8>, PrintError> {
        let start = Instant::now();
        let info = request.options.info.clone();
        let pages = self.render(request).await?;
        let count = pages.len();

        let buffers: Vec<Vec<u8>> = pages.into_iter().map(|page| page.bytes).collect();
        let merged =
            tokio::task::spawn_blocking(move || quire_pdf_composer::combine(&buffers, &info))
                .await??;

        info!(
            "Printed {} item(s) into {} bytes in {:?}",
            count,
            merged.len(),
            start.elapsed()
        );
        Ok(merged)
    }

    pub async fn print_one(
        &self,
        item: ContentItem,
        options: PrintOptions,
    ) -> Result<Vec<u8>, PrintError> {
        self.print(RenderRequest::new(vec![item], options)).await
    }

    pub async fn print_markup<I, S>(
        &self,
        documents: I,
        options: PrintOptions,
    ) -> Result<Vec<u8>, PrintError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.print(RenderRequest::markup(documents, options)).await
    }

    pub async fn print_urls<I, S>(&self, urls: I, options: PrintOptions) -> Result<Vec<u8>, PrintError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.print(RenderRequest::urls(urls, options)).await
    }

    /// Renders every item to its own PDF, without merging.
    ///
    /// Results are ordered by input position. The first failure is returned
    /// as soon as it arrives; the remaining renders finish in the background
    /// and their output is dropped.
    pub async fn render(&self, request: RenderRequest) -> Result<Vec<RenderedPage>, PrintError> {
        validate(&request)?;
        let RenderRequest { items, options } = request;
        let count = items.len();

        let lease = Arc::new(self.engine.acquire().await?);
        let options = Arc::new(options);
        debug!("Rendering {} item(s)", count);

        let mut tasks = Detached(JoinSet::new());
        for (index, item) in items.into_iter().enumerate() {
            tasks.0.spawn(worker::render_item(
                Arc::clone(&lease),
                index,
                item,
                Arc::clone(&options),
            ));
        }
        // Spawned renders hold the only remaining leases.
        drop(lease);

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; count];
        while let Some(joined) = tasks.0.join_next().await {
            match joined.map_err(PrintError::from).and_then(|result| result) {
                Ok(page) => {
                    if let Some(slot) = slots.get_mut(page.index) {
                        *slot = Some(page.bytes);
                    }
                }
                Err(e) => {
                    warn!("Print failed: {}", e);
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| {
                bytes
                    .map(|bytes| RenderedPage { index, bytes })
                    .ok_or_else(|| PrintError::Internal(format!("item {index} produced no output")))
            })
            .collect()
    }
}

fn validate(request: &RenderRequest) -> Result<(), PrintError> {
    if request.items.is_empty() {
        return Err(PrintError::validation("at least one content item is required"));
    }
    request.options.validate()?;
    for (index, item) in request.items.iter().enumerate() {
        if item.kind == ContentKind::Url && item.content.trim().is_empty() {
            return Err(PrintError::validation("URL must not be empty").in_item(index));
        }
    }
    Ok(())
}
