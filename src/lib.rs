//! # frameflow
//!
//! Extract a sequence of still frames from a video at a fixed rate, encode
//! them as images, and bundle them into a ZIP archive.
//!
//! The pipeline has three parts:
//!
//! - a **capture loop** ([`run_capture`]) that seeks a [`VideoSource`] to
//!   each planned timestamp and snapshots the presented frame,
//! - a **processing stage** ([`ProcessingStage`]) on its own thread that
//!   encodes each snapshot, persists it in a [`FrameStore`], and builds the
//!   archive on request,
//! - an **update coalescer** ([`UpdateCoalescer`]) that batches completions
//!   so observers are not flooded with per-frame updates.
//!
//! [`Session`] wires them together.
//!
//! ## Quick Start
//!
//! ```no_run
//! use frameflow::{
//!     DirectorySaver, ExtractionSettings, ImageFormat, MediaSource, PipelineOptions, Session,
//!     VideoSource,
//! };
//!
//! # async fn example() -> Result<(), frameflow::FrameFlowError> {
//! let mut source = MediaSource::open("input.mp4")?;
//! let settings = ExtractionSettings::for_duration(source.metadata().duration)
//!     .with_rate(2.0)
//!     .with_format(ImageFormat::Png);
//!
//! let mut session = Session::new(PipelineOptions::new());
//! session.extract(&mut source, &settings).await?;
//!
//! let base_name = source.metadata().archive_base_name().to_string();
//! session
//!     .save_archive(&base_name, &DirectorySaver::new("."))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Timestamp planning**: rate-based plans that always end on the
//!   requested end time
//! - **Image encoding**: WebP, PNG or JPEG with a reusable drawing surface
//! - **Persistent frame store**: SQLite, in memory or on disk
//! - **ZIP archives**: uncompressed, with per-entry progress
//! - **Progress & cancellation**: throttled callbacks and a shared
//!   [`CancellationToken`]
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed for [`MediaSource`]. Any
//! other [`VideoSource`] implementation works without them at runtime.

pub mod archive;
pub mod capture;
pub mod coalescer;
pub mod configuration;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod message;
pub mod metadata;
pub mod plan;
pub mod progress;
pub mod run_state;
pub mod session;
pub mod snapshot;
pub mod stage;
pub mod store;
mod utilities;
pub mod video;

pub use archive::{ArchiveBuilder, archive_filename, frame_filename};
pub use capture::{CaptureSummary, StatusSink, run_capture};
pub use coalescer::{CompletedFrame, FrameBatch, UpdateCoalescer};
pub use configuration::{
    CoalescerPolicy, ExtractionSettings, ImageFormat, PipelineOptions, StoreLocation,
};
pub use encoder::FrameEncoder;
pub use error::FrameFlowError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use media::MediaSource;
pub use message::{StageEvent, StageRequest};
pub use metadata::VideoMetadata;
pub use plan::TimestampPlan;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use run_state::RunState;
pub use session::{
    ArchiveOutput, ArchiveSaver, DirectorySaver, ExtractionReport, FrameObserver, Session,
};
pub use snapshot::CapturedSnapshot;
pub use stage::{ProcessingStage, StageHandle};
pub use store::{FrameStore, SqliteFrameStore};
pub use video::{SettleNotifier, SettleSignal, VideoSource};
