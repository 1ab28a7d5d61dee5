//! Process spawning and control.

mod error;
mod handle;
mod spec;
mod tokio_process;

pub use error::*;
pub use handle::*;
pub use spec::*;
pub use tokio_process::*;
