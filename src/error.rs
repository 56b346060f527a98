// src/error.rs
use quire_pdf_composer::ComposerError;
use quire_traits::EngineError;
use quire_types::OptionsError;
use thiserror::Error;
use tokio::task::JoinError;

/// Every way a print can fail, grouped by who is at fault.
///
/// `Validation` and `Protocol` are caused by the request (status 400);
/// `Launch` and `Internal` are failures of the service itself (status 500).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrintError {
    #[error("Invalid print request: {0}")]
    Validation(String),

    /// Navigation, rendering or load-timeout failure for a content item.
    #[error("Rendering failed: {0}")]
    Protocol(String),

    #[error("Rendering engine could not be started: {0}")]
    Launch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrintError {
    pub fn validation(message: impl Into<String>) -> Self {
        PrintError::Validation(message.into())
    }

    pub fn status_code(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PrintError::Validation(_) | PrintError::Protocol(_))
    }

    /// Prefixes the message with the position of the item that failed.
    pub fn in_item(self, index: usize) -> Self {
        let prefix = |message: String| format!("item {index}: {message}");
        match self {
            PrintError::Validation(m) => PrintError::Validation(prefix(m)),
            PrintError::Protocol(m) => PrintError::Protocol(prefix(m)),
            PrintError::Launch(m) => PrintError::Launch(m),
            PrintError::Internal(m) => PrintError::Internal(prefix(m)),
        }
    }
}

impl From<EngineError> for PrintError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Protocol(_) | EngineError::Timeout(_) => PrintError::Protocol(e.to_string()),
            EngineError::Launch(message) => PrintError::Launch(message),
            EngineError::Closed | EngineError::Other(_) => PrintError::Internal(e.to_string()),
        }
    }
}

impl From<ComposerError> for PrintError {
    fn from(e: ComposerError) -> Self {
        PrintError::Internal(format!("merging documents: {e}"))
    }
}

impl From<OptionsError> for PrintError {
    fn from(e: OptionsError) -> Self {
        PrintError::Validation(e.to_string())
    }
}

impl From<JoinError> for PrintError {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            PrintError::Internal("render task panicked".to_string())
        } else {
            PrintError::Internal(format!("render task did not complete: {e}"))
        }
    }
}
