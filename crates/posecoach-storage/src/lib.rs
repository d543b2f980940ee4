//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Existence checks and downloads of job input videos
//! - Uploads of comparison videos and PDF reports
//! - Public locators for uploaded artifacts

pub mod client;
pub mod error;
pub mod operations;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use operations::{comparison_video_key, report_key, REPORT_CONTENT_TYPE, VIDEO_CONTENT_TYPE};
