// ffgate Core - Admission, Pool Supervision & Ports
// NO infrastructure dependencies (hexagonal: adapters live in infra-* crates)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AdmissionError, AppError, Result, TranscodeError};
