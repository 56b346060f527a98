use crate::config::Config;
use quire::Printer;
use std::sync::Arc;

/// Shared application state accessible to all handlers
#[derive(Clone)]
pub struct AppState {
    /// Prints through the shared browser
    pub printer: Printer,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(printer: Printer, config: Config) -> Self {
        Self {
            printer,
            config: Arc::new(config),
        }
    }
}
