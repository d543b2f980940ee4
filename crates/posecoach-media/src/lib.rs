#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and artifact rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with stdin frame piping
//! - Progress parsing from `-progress pipe:2`
//! - Frame decoding to RGB and FFprobe metadata
//! - Skeleton overlays and side-by-side composition
//! - MP4 encoding of in-memory frames
//! - PDF assessment reports

pub mod command;
pub mod compose;
pub mod encode;
pub mod error;
pub mod frames;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod report;

pub use command::{require, FfmpegCommand, FfmpegRunner};
pub use compose::{fit_tile, side_by_side, TileSize};
pub use encode::{EncoderSettings, Mp4Encoder};
pub use error::{MediaError, MediaResult, Tool};
pub use frames::{decode_frames, select_frames, split_raw_frames};
pub use overlay::annotate;
pub use probe::{probe_video, VideoInfo, DEFAULT_FPS};
pub use progress::FfmpegProgress;
pub use report::{
    layout_lines, PdfReportRenderer, ReportLine, VIDEO_UNAVAILABLE_HEADING, VIDEO_UNAVAILABLE_TEXT,
};
