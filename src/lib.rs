//! Label Fixture Studio
//!
//! Builds regression-test fixtures for a nutrition label text-recognition and
//! classification pipeline. Detection passes over a photo are reconciled into
//! regions, correlated with the classifier's output, reviewed, and exported
//! into an append-only fixture corpus.

pub mod app;
pub mod classify;
pub mod config;
pub mod fixture;
pub mod session;
pub mod shared;
pub mod storage;
pub mod vision;

pub use app::SessionController;
pub use config::AppConfig;
pub use session::Session;
