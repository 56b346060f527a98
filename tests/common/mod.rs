pub mod pdf_assertions;

use lopdf::Document as LopdfDocument;
use quire::{EngineLauncher, Printer, SharedEngine};
use quire_engine::mock::{MockLauncher, MockProbe};
use std::sync::Arc;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Wrapper around a printed PDF with helper methods
pub struct GeneratedPdf {
    pub doc: LopdfDocument,
}

impl GeneratedPdf {
    /// Create a GeneratedPdf from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Box<dyn std::error::Error>> {
        let doc = LopdfDocument::load_mem(&bytes)?;
        Ok(Self { doc })
    }

    /// Get the number of pages in the PDF
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A printer backed by the in-process engine, plus the engine's probe.
pub fn mock_printer(launcher: MockLauncher) -> (Printer, Arc<MockProbe>) {
    init_logging();
    let probe = launcher.probe();
    let launcher: Arc<dyn EngineLauncher> = Arc::new(launcher);
    (Printer::new(SharedEngine::with_defaults(launcher)), probe)
}
