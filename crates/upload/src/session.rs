//! Upload session state machine.
//!
//! An [`Uploader`] owns at most one [`UploadSession`] and drives it through
//! `idle -> uploading -> {paused, success, error}`. Chunks go out strictly
//! one at a time; pause and cancel are cooperative through a [`CancelSignal`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ferry_transfer::{ChunkPlan, ProgressReporter, SourceFile, validate_file_size};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{FinalizedUpload, TransferBackend};
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::retry::upload_chunk_with_retry;
use crate::signal::{CancelIntent, CancelSignal};
use crate::types::{SessionSnapshot, UploadEvent, UploadOutcome, UploadStatus};

/// Capacity of the event channel handed out by [`Uploader::take_events`].
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Slots progress updates leave free for status and result events.
const EVENT_RESERVE: usize = 32;

/// State of the one upload an [`Uploader`] is responsible for.
#[derive(Debug, Default)]
struct UploadSession {
    file: Option<SourceFile>,
    session_id: Option<String>,
    total_chunks: usize,
    completed_chunks: BTreeSet<usize>,
    status: UploadStatus,
    progress: u8,
    error: Option<String>,
    /// Generation of the chunk loop allowed to write here.
    run: u64,
    signal: CancelSignal,
}

impl UploadSession {
    fn clear(&mut self) {
        self.file = None;
        self.session_id = None;
        self.total_chunks = 0;
        self.completed_chunks.clear();
        self.progress = 0;
        self.error = None;
        self.status = UploadStatus::Idle;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            progress: self.progress,
            file_name: self.file.as_ref().map(|f| f.name().to_string()),
            session_id: self.session_id.clone(),
            total_chunks: self.total_chunks,
            completed_chunks: self.completed_chunks.len(),
            error: self.error.clone(),
        }
    }
}

/// Drives chunked uploads against a [`TransferBackend`].
///
/// Share it in an `Arc` to call [`pause`](Self::pause) or
/// [`cancel`](Self::cancel) while [`start`](Self::start) is being awaited
/// elsewhere. Starting a new file supersedes whatever was running.
pub struct Uploader {
    backend: Arc<dyn TransferBackend>,
    config: UploadConfig,
    session: Mutex<UploadSession>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl Uploader {
    pub fn new(backend: Arc<dyn TransferBackend>, config: UploadConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            session: Mutex::new(UploadSession::default()),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Until it is taken no events are produced. Afterwards progress updates
    /// are skipped while the consumer lags behind, but status changes,
    /// `Completed` and `Failed` are always delivered; a run waits for room
    /// in the channel before reporting how it ended.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Current state of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status
    }

    /// Uploads `file` from its first chunk.
    ///
    /// Resolves once the run comes to rest: completed, paused or cancelled.
    /// Terminal failures leave the session in `error` and are returned as
    /// `Err`. An oversized file is rejected before any backend call and
    /// leaves the current session untouched.
    pub async fn start(&self, file: SourceFile) -> Result<UploadOutcome, UploadError> {
        if let Err(e) = validate_file_size(file.size(), self.config.max_size_mb) {
            let err = UploadError::Validation(e);
            warn!(file = %file.name(), error = %err, "upload rejected");
            self.notify(UploadEvent::Failed {
                message: err.to_string(),
            })
            .await;
            return Err(err);
        }

        let plan = ChunkPlan::new(file.size(), self.config.chunk_size_bytes);
        let (run, signal) = self.begin_run(&file, &plan);
        self.notify(UploadEvent::StatusChanged(UploadStatus::Uploading))
            .await;

        info!(
            file = %file.name(),
            size = file.size(),
            chunks = plan.total_chunks(),
            "upload started"
        );

        let result = self.drive(run, &signal, &file, &plan).await;
        let (outcome, events) = self.finish(run, &signal, &file, result);
        for event in events {
            self.notify(event).await;
        }
        outcome
    }

    /// Stops the running upload, keeping the file for [`resume`](Self::resume).
    ///
    /// The in-flight chunk attempt is abandoned; the backend is not contacted.
    pub fn pause(&self) -> Result<(), UploadError> {
        let mut s = self.lock();
        if s.status != UploadStatus::Uploading {
            return Err(UploadError::InvalidState {
                action: "pause",
                status: s.status,
            });
        }
        s.signal.raise(CancelIntent::Pause);
        s.run += 1;
        s.status = UploadStatus::Paused;
        drop(s);

        info!("upload paused");
        self.notify_now(UploadEvent::StatusChanged(UploadStatus::Paused));
        Ok(())
    }

    /// Runs the upload procedure again on the paused file.
    ///
    /// This restarts from chunk 0 with a fresh backend session; chunks
    /// acknowledged before the pause are uploaded again.
    pub async fn resume(&self) -> Result<UploadOutcome, UploadError> {
        let file = self.retained_file("resume", UploadStatus::Paused)?;
        self.start(file).await
    }

    /// Restarts a failed upload with the same file.
    pub async fn retry(&self) -> Result<UploadOutcome, UploadError> {
        let file = self.retained_file("retry", UploadStatus::Error)?;
        self.start(file).await
    }

    /// Stops any running upload and discards all session state.
    pub fn cancel(&self) {
        let mut s = self.lock();
        s.signal.raise(CancelIntent::Cancel);
        s.run += 1;
        let was = s.status;
        s.clear();
        drop(s);

        if was != UploadStatus::Idle {
            info!(from = %was, "upload cancelled");
            self.notify_now(UploadEvent::StatusChanged(UploadStatus::Idle));
        }
    }

    fn retained_file(
        &self,
        action: &'static str,
        expected: UploadStatus,
    ) -> Result<SourceFile, UploadError> {
        let s = self.lock();
        match (&s.file, s.status) {
            (Some(file), status) if status == expected => Ok(file.clone()),
            (_, status) => Err(UploadError::InvalidState { action, status }),
        }
    }

    /// Replaces the session with a fresh one for `file`.
    fn begin_run(&self, file: &SourceFile, plan: &ChunkPlan) -> (u64, CancelSignal) {
        let mut s = self.lock();
        s.signal.raise(CancelIntent::Cancel);
        s.clear();
        s.run += 1;
        s.signal = CancelSignal::new();
        s.file = Some(file.clone());
        s.total_chunks = plan.total_chunks();
        s.status = UploadStatus::Uploading;
        (s.run, s.signal.clone())
    }

    /// The sequential chunk loop: init, every chunk in order, merge.
    async fn drive(
        &self,
        run: u64,
        signal: &CancelSignal,
        file: &SourceFile,
        plan: &ChunkPlan,
    ) -> Result<FinalizedUpload, UploadError> {
        let total = plan.total_chunks();
        let policy = self.config.retry_policy();

        let session_id = signal
            .guard(self.backend.init_upload(file.name(), file.size(), total))
            .await
            .map_err(UploadError::Cancelled)?
            .map_err(UploadError::Init)?;
        debug!(session = %session_id, "upload session opened");
        self.update(run, signal, |s| s.session_id = Some(session_id.clone()))?;

        let mut reporter = ProgressReporter::new(total);

        for chunk in plan.chunks() {
            signal.check().map_err(UploadError::Cancelled)?;

            let data = file
                .read_chunk(chunk.range.clone())
                .await
                .map_err(|source| UploadError::Read {
                    index: chunk.index,
                    source,
                })?;

            let attempts = upload_chunk_with_retry(
                self.backend.as_ref(),
                signal,
                &policy,
                &data,
                chunk.index,
                &session_id,
            )
            .await?;

            let percent = reporter.record(chunk.index + 1);
            self.update(run, signal, |s| {
                s.completed_chunks.insert(chunk.index);
                s.progress = percent;
            })?;
            self.emit_progress(UploadEvent::Progress {
                percent,
                completed: chunk.index + 1,
                total,
            });
            debug!(
                chunk = chunk.index,
                bytes = chunk.size(),
                attempts,
                progress = percent,
                "chunk uploaded"
            );
        }

        // A pause that lands while merging abandons the merge, even one the
        // server has already applied; resume merges again.
        signal.check().map_err(UploadError::Cancelled)?;
        signal
            .guard(self.backend.merge_chunks(&session_id))
            .await
            .map_err(UploadError::Cancelled)?
            .map_err(UploadError::Merge)
    }

    /// Applies the run's result to the session, unless the run was superseded.
    ///
    /// Returns the outcome together with the events to deliver once the
    /// session lock is released.
    fn finish(
        &self,
        run: u64,
        signal: &CancelSignal,
        file: &SourceFile,
        result: Result<FinalizedUpload, UploadError>,
    ) -> (Result<UploadOutcome, UploadError>, Vec<UploadEvent>) {
        let mut s = self.lock();
        if s.run != run {
            // Paused, cancelled or replaced by a newer start; that caller
            // already updated the session.
            let outcome = match signal.raised() {
                Some(CancelIntent::Pause) => UploadOutcome::Paused,
                _ => UploadOutcome::Cancelled,
            };
            return (Ok(outcome), Vec::new());
        }

        match result {
            Ok(finalized) => {
                s.status = UploadStatus::Success;
                s.progress = 100;
                drop(s);

                info!(file = %file.name(), reference = %finalized.reference, "upload complete");
                let events = vec![
                    UploadEvent::StatusChanged(UploadStatus::Success),
                    UploadEvent::Completed {
                        file_name: file.name().to_string(),
                        reference: finalized.reference.clone(),
                    },
                ];
                (Ok(UploadOutcome::Completed(finalized)), events)
            }
            Err(UploadError::Cancelled(intent)) => {
                // Signal raised without going through pause() or cancel().
                let outcome = match intent {
                    CancelIntent::Pause => {
                        s.status = UploadStatus::Paused;
                        UploadOutcome::Paused
                    }
                    CancelIntent::Cancel => {
                        s.clear();
                        UploadOutcome::Cancelled
                    }
                };
                (Ok(outcome), Vec::new())
            }
            Err(e) => {
                let message = e.to_string();
                s.status = UploadStatus::Error;
                s.error = Some(message.clone());
                drop(s);

                error!(file = %file.name(), error = %message, "upload failed");
                let events = vec![
                    UploadEvent::StatusChanged(UploadStatus::Error),
                    UploadEvent::Failed { message },
                ];
                (Err(e), events)
            }
        }
    }

    /// Mutates the session if `run` is still the current one.
    fn update(
        &self,
        run: u64,
        signal: &CancelSignal,
        f: impl FnOnce(&mut UploadSession),
    ) -> Result<(), UploadError> {
        let mut s = self.lock();
        if s.run != run {
            return Err(UploadError::Cancelled(
                signal.raised().unwrap_or(CancelIntent::Cancel),
            ));
        }
        f(&mut s);
        Ok(())
    }

    fn has_consumer(&self) -> bool {
        self.events_rx.is_none()
    }

    /// Queues a progress update unless the consumer is lagging.
    fn emit_progress(&self, event: UploadEvent) {
        if !self.has_consumer() {
            return;
        }
        if self.events_tx.capacity() <= EVENT_RESERVE {
            trace!(?event, "event consumer lagging, progress update skipped");
            return;
        }
        let _ = self.events_tx.try_send(event);
    }

    /// Delivers a status or result event, waiting for room if needed.
    async fn notify(&self, event: UploadEvent) {
        if self.has_consumer() {
            // Fails only once the receiver is dropped.
            let _ = self.events_tx.send(event).await;
        }
    }

    /// Status change from a synchronous control call; uses the reserved slots.
    fn notify_now(&self, event: UploadEvent) {
        if !self.has_consumer() {
            return;
        }
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            warn!(?event, "event channel full, status change dropped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, UploadSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
