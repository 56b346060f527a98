//! Lifecycle management for the shared rendering engine.
//!
//! [`SharedEngine`] owns at most one engine instance, launches it on first
//! demand and tears it down after a period without any.

pub mod manager;

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use manager::{DEFAULT_IDLE_TIMEOUT, EngineLease, EnginePhase, EngineStatus, SharedEngine};

#[cfg(feature = "chrome")]
pub use chrome::{ChromeConfig, ChromeLauncher};

pub use quire_traits::{Engine, EngineError, EngineLauncher, RenderContext};
