//! iOS project tools for DownloaderApp
//!
//! This crate provides Xcode-specific functionality:
//! - Registering source files in project.pbxproj
//! - Synthetic object identifier generation
//! - Read-only project inspection

pub mod pbxid;
pub mod registrar;
pub mod xcodeproj;

pub use registrar::{Registrar, RegistrationPlan, RegistrationReport, StepOutcome};
pub use xcodeproj::XcodeProject;
