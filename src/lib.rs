//! stampino: a self-hosted bulk text-overlay studio.
//!
//! Users build named ordered lists of short text values, position them as
//! text overlays on a background image, preview the composite, and export
//! per-index renditions bundled into a zip archive.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
