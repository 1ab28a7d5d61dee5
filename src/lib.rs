//! proc-relay - Run an external process and read its stdout as a stream.
//!
//! Stdin feeding, stderr capture, timeout, cancellation and exit-code
//! classification happen in the background; their result is reported when
//! the stream is read to the end.

pub mod config;
pub mod process;
pub mod runner;
