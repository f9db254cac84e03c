//! Domain types for the mlib scanner.
//!
//! # Module Organization
//!
//! - [`entity`] - Catalog entity kinds and the imported [`Song`]
//! - [`folder`] - Folder trees discovered on disk
//! - [`result`] - The persisted [`ScanResult`]
//! - [`status`] - Live scan progress ([`ScanStatus`], [`ScanStep`])
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use mlib_core::{ScanStatus, ScanStep, ScanResult, LibraryFolder};
//! ```

pub mod entity;
pub mod folder;
pub mod result;
pub mod status;

pub use entity::{EntityKind, Song};
pub use folder::{LibraryFolder, LibraryImage, LibrarySong, SongTags};
pub use result::{ArtworkTally, EntityTally, ScanResult};
pub use status::{ScanStatus, ScanStep};
