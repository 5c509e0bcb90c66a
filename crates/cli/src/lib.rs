//! CLI utilities for DownloaderApp development tools
//!
//! Provides shared terminal output formatting and status messages.

#![warn(missing_docs)]

pub mod output;
