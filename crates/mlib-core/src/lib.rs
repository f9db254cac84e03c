//! Core types, errors, and configuration for the mlib media library scanner.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`ScanStatus`] and [`ScanStep`] for the live progress of a scan
//! - [`ScanResult`] for the persisted outcome of a completed scan
//! - [`LibraryFolder`] and friends for the file trees discovered on disk
//! - [`EntityKind`] and [`Song`] for the catalog side
//! - [`Config`] and [`ConfigError`] for configuration loading
//!
//! # Crate Dependencies
//!
//! ```text
//! mlib-cli ──► mlib-scanner ──► mlib-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{CliConfig, Config, ScanConfig};
pub use error::ConfigError;
pub use types::{
    ArtworkTally, EntityKind, EntityTally, LibraryFolder, LibraryImage, LibrarySong, ScanResult,
    ScanStatus, ScanStep, Song, SongTags,
};
