//! Extraction sessions.
//!
//! A [`Session`] ties the pipeline together: it owns the background
//! processing stage, runs the capture loop against a [`VideoSource`], pumps
//! stage events through the [`UpdateCoalescer`] to a [`FrameObserver`], and
//! turns archive requests into saved ZIP files.
//!
//! # Example
//!
//! ```no_run
//! use frameflow::{
//!     DirectorySaver, ExtractionSettings, MediaSource, PipelineOptions, Session, VideoSource,
//! };
//!
//! # async fn example() -> Result<(), frameflow::FrameFlowError> {
//! let mut source = MediaSource::open("input.mp4")?;
//! let settings = ExtractionSettings::for_duration(source.metadata().duration);
//! let base_name = source.metadata().archive_base_name().to_string();
//!
//! let mut session = Session::new(PipelineOptions::new());
//! let report = session.extract(&mut source, &settings).await?;
//! println!("{} frames extracted", report.completed);
//!
//! let saved = session
//!     .save_archive(&base_name, &DirectorySaver::new("out"))
//!     .await?;
//! println!("saved {}", saved.display());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::capture::{CaptureSummary, StatusSink, run_capture};
use crate::coalescer::{CompletedFrame, FrameBatch, UpdateCoalescer};
use crate::configuration::{ExtractionSettings, PipelineOptions};
use crate::error::FrameFlowError;
use crate::message::{StageEvent, StageRequest};
use crate::progress::{OperationType, ProgressTracker};
use crate::run_state::RunState;
use crate::stage::StageHandle;
use crate::store::FrameStore;
use crate::video::VideoSource;

/// Receives UI-facing updates from a session.
///
/// Both methods default to doing nothing.
pub trait FrameObserver: Send + Sync {
    /// A batch of newly completed frames.
    fn on_frames(&self, _batch: &FrameBatch) {}

    /// An advisory status line.
    fn on_status(&self, _message: &str) {}
}

struct NoOpObserver;

impl FrameObserver for NoOpObserver {}

struct ObserverStatus<'a>(&'a dyn FrameObserver);

impl StatusSink for ObserverStatus<'_> {
    fn on_status(&self, message: &str) {
        self.0.on_status(message);
    }
}

/// Host-level save of a finished archive.
pub trait ArchiveSaver {
    /// Persist `payload` under `filename`, returning where it went.
    fn save(&self, payload: &[u8], filename: &str) -> Result<PathBuf, FrameFlowError>;
}

/// Saves archives into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    directory: PathBuf,
    overwrite: bool,
}

impl DirectorySaver {
    /// Save into `directory`, creating it if needed. Existing files are
    /// replaced.
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            overwrite: true,
        }
    }

    /// Refuse to replace an existing file when `overwrite` is `false`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl ArchiveSaver for DirectorySaver {
    fn save(&self, payload: &[u8], filename: &str) -> Result<PathBuf, FrameFlowError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(filename);
        if path.exists() && !self.overwrite {
            return Err(FrameFlowError::Archive(format!(
                "{} already exists",
                path.display()
            )));
        }
        fs::write(&path, payload)?;
        log::info!("Saved archive to {}", path.display());
        Ok(path)
    }
}

/// Result of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionReport {
    /// What the capture loop did.
    pub capture: CaptureSummary,
    /// Frames the processing stage completed and the observer has seen.
    pub completed: u64,
}

/// A finished archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutput {
    /// The ZIP payload.
    pub payload: Vec<u8>,
    /// Suggested file name, `<base>_sequence.zip`.
    pub filename: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Pumped {
    Continue,
    Flushed,
    Cleared,
    ArchiveReady(ArchiveOutput),
    ArchiveFailed(String),
    FrameData(u64, Vec<u8>),
    FrameUnavailable(u64, String),
}

/// Session-side view of completed frames.
struct Updates {
    coalescer: UpdateCoalescer,
    frames: BTreeMap<u64, Duration>,
}

impl Updates {
    fn reset(&mut self) {
        self.coalescer.reset();
        self.frames.clear();
    }

    fn surface(&mut self, batch: Option<FrameBatch>, observer: &dyn FrameObserver) {
        if let Some(batch) = batch {
            for frame in &batch.frames {
                self.frames.insert(frame.id, frame.timestamp);
            }
            observer.on_frames(&batch);
            observer.on_status(&batch.status());
        }
    }

    fn apply(
        &mut self,
        event: StageEvent,
        observer: &dyn FrameObserver,
        archive_progress: Option<&ProgressTracker>,
    ) -> Pumped {
        let now = Instant::now();
        match event {
            StageEvent::FrameProcessed { id, timestamp } => {
                let batch = self
                    .coalescer
                    .on_completion(CompletedFrame { id, timestamp }, now);
                self.surface(batch, observer);
                Pumped::Continue
            }
            StageEvent::Flush { count } => {
                let batch = self.coalescer.flush(now);
                self.surface(batch, observer);
                if count != self.coalescer.total_processed() {
                    log::debug!(
                        "Stage flushed {count} completions, {} observed",
                        self.coalescer.total_processed()
                    );
                }
                Pumped::Flushed
            }
            StageEvent::Status(message) => {
                observer.on_status(&message);
                Pumped::Continue
            }
            StageEvent::ArchiveProgress(percent) => {
                if let Some(tracker) = archive_progress {
                    tracker.report_percentage(percent);
                }
                Pumped::Continue
            }
            StageEvent::ArchiveReady { payload, filename } => {
                Pumped::ArchiveReady(ArchiveOutput { payload, filename })
            }
            StageEvent::ArchiveFailed { reason } => Pumped::ArchiveFailed(reason),
            StageEvent::FrameData { id, payload } => Pumped::FrameData(id, payload),
            StageEvent::FrameUnavailable { id, reason } => Pumped::FrameUnavailable(id, reason),
            StageEvent::Cleared => Pumped::Cleared,
        }
    }
}

/// One extraction pipeline: a processing stage plus the UI-side state that
/// listens to it. Runs happen one at a time.
pub struct Session {
    options: PipelineOptions,
    run: RunState,
    stage: StageHandle,
    updates: Updates,
    observer: Arc<dyn FrameObserver>,
}

impl Session {
    /// Start a session with a SQLite store at the configured location.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: PipelineOptions) -> Self {
        let run = RunState::new(options.cancellation.clone());
        let stage = StageHandle::spawn(&options, run.clone());
        Self::assemble(options, run, stage)
    }

    /// Start a session around an already opened store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_store<S>(store: S, options: PipelineOptions) -> Self
    where
        S: FrameStore + Send + 'static,
    {
        let run = RunState::new(options.cancellation.clone());
        let stage = StageHandle::spawn_with_store(store, &options, run.clone());
        Self::assemble(options, run, stage)
    }

    fn assemble(options: PipelineOptions, run: RunState, stage: StageHandle) -> Self {
        Self {
            updates: Updates {
                coalescer: UpdateCoalescer::new(options.coalescer),
                frames: BTreeMap::new(),
            },
            options,
            run,
            stage,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// Deliver frame batches and status lines to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shared run state.
    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    /// Request cancellation of the capture loop. A request made while
    /// [`extract`](Session::extract) is still preparing stops that run before
    /// its first capture.
    pub fn cancel(&self) {
        self.run.request_cancel();
    }

    /// Ids and timestamps of every frame surfaced so far, in id order.
    pub fn frames(&self) -> &BTreeMap<u64, Duration> {
        &self.updates.frames
    }

    /// Run one extraction of `video` with `settings`.
    ///
    /// Clears the store and manifest of the previous run first. Returns once
    /// the capture loop has finished and, unless cancelled, every dispatched
    /// frame has been reported. Frames still in flight after a cancellation
    /// complete in the background and are surfaced by later calls.
    ///
    /// # Errors
    ///
    /// - [`FrameFlowError::ResourceNotReady`] if the video has no usable
    ///   metadata; nothing is changed.
    /// - [`FrameFlowError::InvalidSettings`] for out-of-range settings;
    ///   nothing is changed.
    /// - [`FrameFlowError::StageClosed`] if the processing stage died.
    pub async fn extract<V: VideoSource + ?Sized>(
        &mut self,
        video: &mut V,
        settings: &ExtractionSettings,
    ) -> Result<ExtractionReport, FrameFlowError> {
        if !video.metadata().is_ready() {
            self.observer.on_status("Error: Resources not ready");
            return Err(FrameFlowError::ResourceNotReady);
        }
        if let Err(error) = settings.validate() {
            self.observer.on_status(&format!("Error: {error}"));
            return Err(error);
        }

        // Rearm before the first await so a cancel issued while the stage is
        // still clearing applies to this run.
        self.run.rearm();
        self.observer.on_status("Initializing sequence...");
        self.clear().await?;

        let requests = self.stage.requests().clone();
        let status = ObserverStatus(self.observer.as_ref());
        let capture = run_capture(
            video,
            settings,
            &self.options,
            &self.run,
            &requests,
            &status,
        );
        tokio::pin!(capture);

        // A zero interval means no latency batching; the ticker still needs a period.
        let tick = self.options.coalescer.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary: Option<CaptureSummary> = None;
        let mut flushed = false;

        loop {
            tokio::select! {
                result = &mut capture, if summary.is_none() => {
                    let done = result?;
                    summary = Some(done);
                    if done.cancelled {
                        break;
                    }
                }
                event = self.stage.next_event() => {
                    let event = event.ok_or(FrameFlowError::StageClosed)?;
                    if self.updates.apply(event, self.observer.as_ref(), None) == Pumped::Flushed {
                        flushed = true;
                    }
                }
                _ = ticker.tick() => {
                    let batch = self.updates.coalescer.poll(Instant::now());
                    self.updates.surface(batch, self.observer.as_ref());
                }
            }

            if summary.is_some() && flushed {
                break;
            }
        }

        let capture = summary.ok_or(FrameFlowError::Cancelled)?;
        Ok(ExtractionReport {
            capture,
            completed: self.updates.coalescer.total_processed(),
        })
    }

    /// Surface completions that arrived since the last call without waiting
    /// for more.
    pub fn drain(&mut self) {
        while let Some(event) = self.stage.try_next_event() {
            self.updates.apply(event, self.observer.as_ref(), None);
        }
        let batch = self.updates.coalescer.flush(Instant::now());
        self.updates.surface(batch, self.observer.as_ref());
    }

    /// Serialize every stored frame into a ZIP archive named
    /// `<base_name>_sequence.zip`.
    ///
    /// Archive progress goes to the configured progress callback.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::Archive`] if nothing has been extracted or
    /// serialization fails; the stored frames remain available for a retry.
    pub async fn generate_archive(
        &mut self,
        base_name: &str,
    ) -> Result<ArchiveOutput, FrameFlowError> {
        if self.run.total_completed() == 0 {
            return Err(FrameFlowError::Archive(
                "no frames have been extracted".to_string(),
            ));
        }

        self.stage
            .send(StageRequest::GenerateArchive {
                base_name: base_name.to_string(),
            })
            .await?;

        let tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            OperationType::ArchiveGeneration,
            None,
            Duration::ZERO,
        );

        loop {
            let event = self
                .stage
                .next_event()
                .await
                .ok_or(FrameFlowError::StageClosed)?;
            match self
                .updates
                .apply(event, self.observer.as_ref(), Some(&tracker))
            {
                Pumped::ArchiveReady(output) => return Ok(output),
                Pumped::ArchiveFailed(reason) => {
                    self.observer.on_status(&format!("Archive failed: {reason}"));
                    return Err(FrameFlowError::Archive(reason));
                }
                _ => {}
            }
        }
    }

    /// Generate the archive and hand it to `saver`.
    pub async fn save_archive(
        &mut self,
        base_name: &str,
        saver: &dyn ArchiveSaver,
    ) -> Result<PathBuf, FrameFlowError> {
        let output = self.generate_archive(base_name).await?;
        let path = saver.save(&output.payload, &output.filename)?;
        self.observer.on_status("Download complete");
        Ok(path)
    }

    /// Read one stored frame back from the processing stage.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::FrameNotFound`] (or the store's error) when
    /// the frame is not stored.
    pub async fn get_frame(&mut self, id: u64) -> Result<Vec<u8>, FrameFlowError> {
        self.stage.send(StageRequest::GetFrame { id }).await?;
        loop {
            let event = self
                .stage
                .next_event()
                .await
                .ok_or(FrameFlowError::StageClosed)?;
            match self.updates.apply(event, self.observer.as_ref(), None) {
                Pumped::FrameData(data_id, payload) if data_id == id => return Ok(payload),
                Pumped::FrameUnavailable(missing, reason) if missing == id => {
                    log::debug!("Frame {id} unavailable: {reason}");
                    return Err(FrameFlowError::FrameNotFound(id));
                }
                _ => {}
            }
        }
    }

    /// Erase the store and manifest and forget surfaced frames.
    ///
    /// Waits until the stage confirms; events from before the clear are
    /// discarded. Calling it repeatedly is harmless.
    pub async fn clear(&mut self) -> Result<(), FrameFlowError> {
        self.stage.send(StageRequest::Clear).await?;
        loop {
            let event = self
                .stage
                .next_event()
                .await
                .ok_or(FrameFlowError::StageClosed)?;
            if event == StageEvent::Cleared {
                break;
            }
            if let StageEvent::Status(message) = event {
                self.observer.on_status(&message);
            }
        }
        self.updates.reset();
        Ok(())
    }

    /// Stop the processing stage after it has drained its queue.
    pub async fn shutdown(self) -> Result<(), FrameFlowError> {
        self.stage.shutdown().await
    }
}
