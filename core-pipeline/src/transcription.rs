//! Transcription orchestration.
//!
//! Decides which files need a transcript, queues one job per file on the
//! transcription [`TaskQueue`], and drives each job through
//! `extracting → transcribing → completed | error` in the status store.

use crate::error::Result;
use crate::failure::JobFailure;
use crate::jobs::{emit_job, forward_queue_stats, run_with_deadline};
use crate::selection::{select_transcription_provider, TranscriptionChoice};
use bridge_traits::{
    ProgressCallback, SecureStore, TranscriptionEngine, TranscriptionProgress,
    TranscriptionRequest, TranscriptionStage,
};
use core_async::time::Instant;
use core_library::tree::list_all_files;
use core_library::{FileEntry, FileStatus, FileStatusStore, FolderEntry, ProviderInfo, Transcript};
use core_queue::{task, TaskQueue};
use core_runtime::config::{CoreConfig, TranscriptionSettings};
use core_runtime::events::{EventBus, JobEvent};
use core_runtime::logging::strip_path;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Name of the transcription queue in logs and events.
pub const TRANSCRIPTION_QUEUE: &str = "transcription";

/// Everything a running job needs; cloned into each job with the store bound
/// to the session current at submission.
#[derive(Clone)]
struct JobContext {
    store: FileStatusStore,
    engines: Arc<[Arc<dyn TranscriptionEngine>]>,
    secure_store: Arc<dyn SecureStore>,
    settings: Arc<RwLock<TranscriptionSettings>>,
    event_bus: EventBus,
}

impl JobContext {
    fn settings(&self) -> TranscriptionSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run(self, path: String, size: u64) -> anyhow::Result<()> {
        let started = Instant::now();
        self.store
            .update_status(&path, FileStatus::Extracting, Some(0), None)?;

        let result = self.transcribe(&path, size).await;
        if !self.store.is_current() {
            debug!(file = %strip_path(&path), "Directory closed, discarding transcription result");
            return Ok(());
        }

        match result {
            Ok(transcript) => {
                let duration_secs = started.elapsed().as_secs_f64();
                info!(
                    file = %strip_path(&path),
                    provider = %transcript.source.provider,
                    model = %transcript.source.model,
                    duration_secs,
                    "Transcription completed"
                );
                self.store.set_transcript(&path, transcript)?;
                emit_job(
                    &self.event_bus,
                    JobEvent::Completed {
                        queue: TRANSCRIPTION_QUEUE.to_string(),
                        path,
                        duration_secs,
                    },
                );
                Ok(())
            }
            Err(failure) => {
                let message = failure.user_message();
                warn!(
                    file = %strip_path(&path),
                    category = failure.category(),
                    error = %message,
                    "Transcription failed"
                );
                self.store
                    .update_status(&path, FileStatus::Error, None, Some(message.clone()))?;
                emit_job(
                    &self.event_bus,
                    JobEvent::Failed {
                        queue: TRANSCRIPTION_QUEUE.to_string(),
                        path,
                        message,
                    },
                );
                Err(failure.into())
            }
        }
    }

    async fn transcribe(&self, path: &str, size: u64) -> std::result::Result<Transcript, JobFailure> {
        let settings = self.settings();
        let TranscriptionChoice { engine, model } =
            select_transcription_provider(&settings, &self.engines, self.secure_store.as_ref())
                .await
                .ok_or_else(|| {
                    JobFailure::ProviderUnavailable(
                        "No transcription provider available. Install a local model or add an OpenAI API key."
                            .to_string(),
                    )
                })?;
        let kind = engine.kind();

        if let Some(limit) = engine.max_input_bytes() {
            if size > limit {
                return Err(JobFailure::FileTooLarge { size, limit });
            }
        }

        emit_job(
            &self.event_bus,
            JobEvent::Started {
                queue: TRANSCRIPTION_QUEUE.to_string(),
                path: path.to_string(),
                provider: kind.to_string(),
            },
        );
        debug!(file = %strip_path(path), provider = %kind, model = %model, "Transcribing");

        let request = TranscriptionRequest {
            path: PathBuf::from(path),
            model: model.clone(),
            language: settings.language.clone(),
        };
        let output = run_with_deadline(
            settings.job_timeout,
            engine.transcribe(request, self.progress_reporter(path)),
        )
        .await?;

        Ok(Transcript {
            segments: output.segments,
            full_text: output.full_text,
            language: output.language,
            duration: output.duration,
            source: ProviderInfo::transcription(kind, model),
        })
    }

    /// Progress callback bound to one path.
    fn progress_reporter(&self, path: &str) -> ProgressCallback {
        let store = self.store.clone();
        let event_bus = self.event_bus.clone();
        let path = path.to_string();
        Arc::new(move |progress: TranscriptionProgress| {
            let status = match progress.stage {
                TranscriptionStage::ExtractingAudio => FileStatus::Extracting,
                TranscriptionStage::Transcribing => FileStatus::Transcribing,
            };
            if let Err(e) = store.update_status(&path, status, Some(progress.percent), None) {
                debug!(file = %strip_path(&path), error = %e, "Progress update rejected");
                return;
            }
            emit_job(
                &event_bus,
                JobEvent::Progress {
                    queue: TRANSCRIPTION_QUEUE.to_string(),
                    path: path.clone(),
                    stage: status.as_str().to_string(),
                    percent: progress.percent.min(100),
                },
            );
        })
    }
}

/// Queues and runs transcription jobs.
#[derive(Clone)]
pub struct TranscriptionOrchestrator {
    queue: TaskQueue,
    context: JobContext,
}

impl TranscriptionOrchestrator {
    pub fn new(config: &CoreConfig, store: FileStatusStore, event_bus: EventBus) -> Result<Self> {
        let queue = TaskQueue::new(TRANSCRIPTION_QUEUE, config.transcription.max_concurrent)?;
        forward_queue_stats(&queue, &event_bus);

        Ok(Self {
            queue,
            context: JobContext {
                store,
                engines: config.transcription_engines.clone().into(),
                secure_store: Arc::clone(&config.secure_store),
                settings: Arc::new(RwLock::new(config.transcription.clone())),
                event_bus,
            },
        })
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Settings used by the next job.
    pub fn settings(&self) -> TranscriptionSettings {
        self.context.settings()
    }

    /// Changes the transcription language for jobs that start from now on.
    /// `None` means auto-detect.
    pub fn set_language(&self, language: Option<String>) {
        let mut settings = self
            .context
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        settings.language = language.filter(|l| !l.is_empty() && l != "auto");
    }

    /// Pending and not already tracked by the queue.
    pub fn is_eligible(&self, file: &FileEntry) -> bool {
        file.status == FileStatus::Pending && !self.queue.has(&file.path)
    }

    /// Files in `tree` that [`dispatch`](Self::dispatch) would queue, in
    /// tree order.
    pub fn eligible_files<'a>(&self, tree: &'a FolderEntry) -> Vec<&'a FileEntry> {
        list_all_files(tree)
            .into_iter()
            .filter(|file| self.is_eligible(file))
            .collect()
    }

    /// Queues every eligible file in `tree`. Returns how many were queued.
    pub fn dispatch(&self, tree: &FolderEntry) -> Result<usize> {
        let mut queued = 0;
        for file in self.eligible_files(tree) {
            if self.submit(file)? {
                queued += 1;
            }
        }
        if queued > 0 {
            info!(count = queued, "Queued files for transcription");
        }
        Ok(queued)
    }

    /// Queues one file. Clears any finished or failed queue entry for the
    /// path first so the file can be processed again. Returns `false` when
    /// the file is already pending or running.
    pub fn submit(&self, file: &FileEntry) -> Result<bool> {
        if self.queue.is_active(&file.path) {
            return Ok(false);
        }
        self.queue.reset_item(&file.path);

        let context = JobContext {
            store: self.context.store.session(),
            ..self.context.clone()
        };
        let path = file.path.clone();
        let size = file.size;
        let queued = self
            .queue
            .enqueue(file.path.clone(), task(move || context.run(path, size)))?;
        if queued {
            debug!(file = %strip_path(&file.path), "Queued for transcription");
        }
        Ok(queued)
    }

    /// Removes a file that has not started yet.
    pub fn cancel(&self, path: &str) -> bool {
        self.queue.dequeue(path)
    }

    /// Provider the next job would use.
    pub async fn select_provider(&self) -> Option<TranscriptionChoice> {
        let settings = self.settings();
        select_transcription_provider(
            &settings,
            &self.context.engines,
            self.context.secure_store.as_ref(),
        )
        .await
    }
}

impl std::fmt::Debug for TranscriptionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionOrchestrator")
            .field("queue", &self.queue)
            .field("engines", &self.context.engines.len())
            .finish()
    }
}
