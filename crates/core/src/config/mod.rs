//! Configuration loading and schema definitions
//!
//! The built-in defaults describe the DownloaderApp project, so an absent or
//! empty configuration file reproduces the stock registration.

mod loader;
mod schema;

pub use loader::Config;
pub use schema::*;
