//! The processing stage.
//!
//! [`ProcessingStage`] owns the [`FrameEncoder`], the [`FrameStore`] and the
//! [`ArchiveBuilder`] for the current run. It runs on its own blocking thread
//! (see [`StageHandle::spawn`]) and talks to the rest of the pipeline only
//! through [`StageRequest`] and [`StageEvent`] messages.
//!
//! Per-frame failures never stop the stage: the frame is dropped, a status
//! event describes what happened, and the next request is handled.

use std::collections::HashSet;

use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::archive::{ArchiveBuilder, archive_filename, frame_filename};
use crate::configuration::{ImageFormat, PipelineOptions, StoreLocation};
use crate::encoder::FrameEncoder;
use crate::error::FrameFlowError;
use crate::message::{StageEvent, StageRequest};
use crate::run_state::RunState;
use crate::snapshot::CapturedSnapshot;
use crate::store::{FrameStore, SqliteFrameStore};

type StoreOpener<S> = Box<dyn FnMut() -> Result<S, FrameFlowError> + Send>;

/// Encodes, persists and archives frames for one run at a time.
pub struct ProcessingStage<S: FrameStore = SqliteFrameStore> {
    encoder: FrameEncoder,
    store: Option<S>,
    open_store: StoreOpener<S>,
    archive: ArchiveBuilder,
    registered: HashSet<u64>,
    completed_since_flush: u64,
    run: RunState,
    events: UnboundedSender<StageEvent>,
}

impl ProcessingStage<SqliteFrameStore> {
    /// Create a stage whose SQLite store is opened at `location` on first use.
    pub fn new(
        location: StoreLocation,
        archive_folder: impl Into<String>,
        run: RunState,
        events: UnboundedSender<StageEvent>,
    ) -> Self {
        Self {
            encoder: FrameEncoder::new(),
            store: None,
            open_store: Box::new(move || SqliteFrameStore::open_location(&location)),
            archive: ArchiveBuilder::new(archive_folder),
            registered: HashSet::new(),
            completed_since_flush: 0,
            run,
            events,
        }
    }
}

impl<S: FrameStore> ProcessingStage<S> {
    /// Create a stage around an already opened store.
    pub fn with_store(
        store: S,
        archive_folder: impl Into<String>,
        run: RunState,
        events: UnboundedSender<StageEvent>,
    ) -> Self {
        Self {
            encoder: FrameEncoder::new(),
            store: Some(store),
            open_store: Box::new(|| Err(FrameFlowError::Store("store was closed".to_string()))),
            archive: ArchiveBuilder::new(archive_folder),
            registered: HashSet::new(),
            completed_since_flush: 0,
            run,
            events,
        }
    }

    /// Dispatch one request, turning failures into status events.
    pub fn handle(&mut self, request: StageRequest) {
        log::trace!("Stage received {}", request.kind());

        let result = match request {
            StageRequest::ProcessFrame {
                snapshot,
                quality,
                format,
            } => self.process(snapshot, quality, format),
            StageRequest::FlushRequest => {
                self.flush();
                Ok(())
            }
            StageRequest::GenerateArchive { base_name } => self.generate_archive(&base_name),
            StageRequest::GetFrame { id } => self.get_frame(id),
            StageRequest::Clear => self.clear(),
        };

        if let Err(error) = result {
            log::warn!("{error}");
            self.emit(StageEvent::Status(error.to_string()));
        }
    }

    /// Encode, persist and register one frame, then emit `FrameProcessed`.
    ///
    /// The snapshot is released right after encoding whether or not encoding
    /// succeeded. A frame that fails at any step is lost; earlier frames are
    /// unaffected.
    pub fn process(
        &mut self,
        snapshot: CapturedSnapshot,
        quality: f32,
        format: ImageFormat,
    ) -> Result<(), FrameFlowError> {
        let id = snapshot.id();
        let timestamp = snapshot.timestamp();

        if self.registered.contains(&id) {
            snapshot.release();
            return Err(FrameFlowError::EncodeFailed {
                id,
                reason: "frame id was already processed in this run".to_string(),
            });
        }

        let encoded = self.encoder.encode(&snapshot, format, quality);
        snapshot.release();
        let payload = encoded?;

        self.store()?.put(id, &payload)?;
        self.archive.add(frame_filename(id, format), payload);
        self.registered.insert(id);

        self.completed_since_flush += 1;
        self.run.record_completion();
        self.emit(StageEvent::FrameProcessed { id, timestamp });
        Ok(())
    }

    /// Emit `Flush` with the completions counted since the previous flush.
    pub fn flush(&mut self) {
        let count = std::mem::take(&mut self.completed_since_flush);
        log::debug!("Flushing {count} completions");
        self.emit(StageEvent::Flush { count });
    }

    /// Serialize the manifest and emit progress followed by `ArchiveReady`.
    ///
    /// On failure emits `ArchiveFailed`; stored frames stay intact so the
    /// request can be repeated.
    pub fn generate_archive(&mut self, base_name: &str) -> Result<(), FrameFlowError> {
        self.emit(StageEvent::Status(
            "Merging frames into ZIP archive...".to_string(),
        ));

        let events = self.events.clone();
        let result = self.archive.serialize(|percent| {
            let _ = events.send(StageEvent::ArchiveProgress(percent));
        });

        match result {
            Ok(payload) => {
                let filename = archive_filename(base_name);
                log::info!("Archive {filename} ready ({} bytes)", payload.len());
                self.emit(StageEvent::ArchiveReady { payload, filename });
                Ok(())
            }
            Err(error) => {
                self.emit(StageEvent::ArchiveFailed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Read a stored frame back and emit it as `FrameData`.
    pub fn get_frame(&mut self, id: u64) -> Result<(), FrameFlowError> {
        match self.store().and_then(|store| store.get(id)) {
            Ok(payload) => {
                self.emit(StageEvent::FrameData { id, payload });
                Ok(())
            }
            Err(error) => {
                self.emit(StageEvent::FrameUnavailable {
                    id,
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Reset the manifest and erase the store, then emit `Cleared`. Safe to
    /// repeat.
    pub fn clear(&mut self) -> Result<(), FrameFlowError> {
        self.archive.reset();
        self.registered.clear();
        self.completed_since_flush = 0;
        self.run.reset_completed();
        let result = self.store().and_then(|store| store.clear());
        self.emit(StageEvent::Cleared);
        result
    }

    /// Number of entries currently in the archive manifest.
    pub fn manifest_len(&self) -> usize {
        self.archive.len()
    }

    /// Handle requests until every sender has been dropped.
    pub fn run_blocking(mut self, mut requests: Receiver<StageRequest>) {
        log::debug!("Processing stage started");
        while let Some(request) = requests.blocking_recv() {
            self.handle(request);
        }
        log::debug!("Processing stage stopped");
    }

    fn store(&mut self) -> Result<&mut S, FrameFlowError> {
        if self.store.is_none() {
            self.store = Some((self.open_store)()?);
        }
        self.store
            .as_mut()
            .ok_or_else(|| FrameFlowError::Store("frame store is unavailable".to_string()))
    }

    fn emit(&self, event: StageEvent) {
        // Nobody listening is not an error for the stage.
        let _ = self.events.send(event);
    }
}

/// Channels to a processing stage running on a background thread.
#[derive(Debug)]
pub struct StageHandle {
    requests: Sender<StageRequest>,
    events: UnboundedReceiver<StageEvent>,
    task: JoinHandle<()>,
}

impl StageHandle {
    /// Spawn a SQLite-backed stage configured by `options`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(options: &PipelineOptions, run: RunState) -> Self {
        let (event_sender, events) = mpsc::unbounded_channel();
        let stage = ProcessingStage::new(
            options.store.clone(),
            options.archive_folder.clone(),
            run,
            event_sender,
        );
        Self::launch(stage, events, options.channel_capacity)
    }

    /// Spawn a stage around an already opened store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_with_store<S>(store: S, options: &PipelineOptions, run: RunState) -> Self
    where
        S: FrameStore + Send + 'static,
    {
        let (event_sender, events) = mpsc::unbounded_channel();
        let stage =
            ProcessingStage::with_store(store, options.archive_folder.clone(), run, event_sender);
        Self::launch(stage, events, options.channel_capacity)
    }

    fn launch<S>(
        stage: ProcessingStage<S>,
        events: UnboundedReceiver<StageEvent>,
        capacity: usize,
    ) -> Self
    where
        S: FrameStore + Send + 'static,
    {
        let (requests, receiver) = mpsc::channel(capacity.max(1));
        let task = tokio::task::spawn_blocking(move || stage.run_blocking(receiver));
        Self {
            requests,
            events,
            task,
        }
    }

    /// A sender for submitting requests.
    pub fn requests(&self) -> &Sender<StageRequest> {
        &self.requests
    }

    /// Submit one request, waiting for queue space if necessary.
    pub async fn send(&self, request: StageRequest) -> Result<(), FrameFlowError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| FrameFlowError::StageClosed)
    }

    /// Receive the next event, or `None` once the stage has stopped.
    pub async fn next_event(&mut self) -> Option<StageEvent> {
        self.events.recv().await
    }

    /// Receive an event if one is already waiting.
    pub fn try_next_event(&mut self) -> Option<StageEvent> {
        self.events.try_recv().ok()
    }

    /// Stop accepting requests and wait for the stage to drain its queue.
    pub async fn shutdown(self) -> Result<(), FrameFlowError> {
        drop(self.requests);
        self.task.await.map_err(|_| FrameFlowError::StageClosed)
    }
}
