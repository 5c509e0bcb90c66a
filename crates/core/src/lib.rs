//! Core utilities for DownloaderApp development tools
//!
//! This crate provides shared functionality used by the tool crates:
//!
//! - **Error handling**: errors with codes, context, and recovery suggestions
//! - **Configuration**: TOML-based registration settings with built-in defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use downloader_core::config::Config;
//!
//! let config = Config::load(None).expect("invalid configuration");
//! println!("Project: {}", config.schema.project.pbxproj);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

pub use error::{Error, ErrorCode, Result, ResultExt};
