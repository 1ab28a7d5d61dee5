//! Process runs: output streaming, background relays and exit resolution.

mod blocking;
mod error;
mod finalizer;
mod outcome;
mod output;
mod process_runner;
pub mod relay;
mod signal;

pub use blocking::*;
pub use error::*;
pub use finalizer::FinalizerState;
pub use outcome::*;
pub use output::*;
pub use process_runner::*;
pub use signal::*;
