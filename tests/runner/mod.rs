#[cfg(unix)]
mod process_test;
mod scripted;
