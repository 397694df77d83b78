//! ffgate daemon library
//!
//! Configuration, logging and wiring shared by the `ffgate` binary and the
//! integration tests.

pub mod app;
pub mod config;
pub mod logging;

pub use app::App;
pub use config::Settings;
