//! dvx-av: everything that touches an external tool process.
//!
//! This crate provides:
//! - [`ToolRegistry`] discovery of the ffmpeg / ffprobe / dovi_tool / MP4Box
//!   binaries
//! - [`ProcessPipe`], a cancellable subprocess handle with its stderr always
//!   drained to a log file
//! - [`transfer`], the bounded byte pump between two pipe ends
//! - [`DownmuxPipeline`], the three-stage Profile 7 to Profile 8.1 conversion
//! - remux command construction and execution
//! - an ffprobe-backed prober for standalone (catalog-less) use

pub mod downmux;
pub mod pipe;
pub mod probe;
pub mod remux;
pub mod tools;
pub mod transfer;

// Re-exports
pub use downmux::DownmuxPipeline;
pub use pipe::{ProcessPipe, StdinMode, StdoutMode};
pub use probe::{probe_file, ProbeResult};
pub use remux::{build_remux_args, run_remux, RemuxJob};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transfer::{transfer, DEFAULT_CHUNK_SIZE};
