//! Summarization orchestration.
//!
//! Files with a finished transcript and no summary are summarized by the
//! single configured provider, on their own queue so summaries never take
//! transcription slots.

use crate::error::Result;
use crate::failure::JobFailure;
use crate::jobs::{emit_job, forward_queue_stats, run_with_deadline};
use crate::selection::{has_credential, select_summarization_provider, summary_label, SummaryChoice};
use bridge_traits::{SecureStore, SummarizationEngine, SummaryRequest};
use chrono::Utc;
use core_async::time::Instant;
use core_library::tree::list_all_files;
use core_library::{
    FileEntry, FileStatus, FileStatusStore, FolderEntry, ProviderInfo, Summary, SummaryStatus,
};
use core_queue::{task, TaskQueue};
use core_runtime::config::{CoreConfig, SummarizationSettings};
use core_runtime::events::{EventBus, JobEvent};
use core_runtime::logging::strip_path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Name of the summarization queue in logs and events.
pub const SUMMARIZATION_QUEUE: &str = "summarization";

#[derive(Clone)]
struct JobContext {
    store: FileStatusStore,
    engines: Arc<[Arc<dyn SummarizationEngine>]>,
    secure_store: Arc<dyn SecureStore>,
    settings: Arc<RwLock<SummarizationSettings>>,
    event_bus: EventBus,
}

impl JobContext {
    fn settings(&self) -> SummarizationSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run(self, path: String) -> anyhow::Result<()> {
        let started = Instant::now();
        self.store
            .update_summary_status(&path, SummaryStatus::Summarizing, None)?;
        emit_job(
            &self.event_bus,
            JobEvent::Progress {
                queue: SUMMARIZATION_QUEUE.to_string(),
                path: path.clone(),
                stage: SummaryStatus::Summarizing.as_str().to_string(),
                percent: 0,
            },
        );

        let result = self.summarize(&path).await;
        if !self.store.is_current() {
            debug!(file = %strip_path(&path), "Directory closed, discarding summary result");
            return Ok(());
        }

        match result {
            Ok(summary) => {
                let duration_secs = started.elapsed().as_secs_f64();
                info!(
                    file = %strip_path(&path),
                    provider = %summary.source.provider,
                    duration_secs,
                    "Summary completed"
                );
                self.store.set_summary(&path, summary)?;
                emit_job(
                    &self.event_bus,
                    JobEvent::Completed {
                        queue: SUMMARIZATION_QUEUE.to_string(),
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
                    "Summary failed"
                );
                self.store
                    .update_summary_status(&path, SummaryStatus::Error, Some(message.clone()))?;
                emit_job(
                    &self.event_bus,
                    JobEvent::Failed {
                        queue: SUMMARIZATION_QUEUE.to_string(),
                        path,
                        message,
                    },
                );
                Err(failure.into())
            }
        }
    }

    async fn summarize(&self, path: &str) -> std::result::Result<Summary, JobFailure> {
        let settings = self.settings();
        let SummaryChoice { engine, model } =
            select_summarization_provider(&settings, &self.engines).ok_or_else(|| {
                JobFailure::ProviderUnavailable(
                    "No summary provider selected. Choose one in settings.".to_string(),
                )
            })?;
        let kind = engine.kind();
        let label = summary_label(kind);

        if let Some(key) = kind.credential_key() {
            if !has_credential(self.secure_store.as_ref(), key).await {
                return Err(JobFailure::MissingCredential {
                    provider: label.to_string(),
                });
            }
        }
        if !engine.is_available().await {
            return Err(JobFailure::ProviderUnavailable(format!(
                "{label} is not reachable. Make sure it is running."
            )));
        }

        let transcript = self
            .store
            .get(path)
            .and_then(|record| record.transcript)
            .filter(|transcript| !transcript.is_empty())
            .ok_or_else(|| JobFailure::Failed("There is no transcript to summarize".to_string()))?;
        let language = if settings.language.eq_ignore_ascii_case("auto") {
            transcript.language.clone()
        } else {
            settings.language.clone()
        };

        emit_job(
            &self.event_bus,
            JobEvent::Started {
                queue: SUMMARIZATION_QUEUE.to_string(),
                path: path.to_string(),
                provider: kind.to_string(),
            },
        );
        debug!(file = %strip_path(path), provider = %kind, model = %model, "Summarizing");

        let request = SummaryRequest {
            text: transcript.full_text,
            language: language.clone(),
            model: model.clone(),
        };
        let text = run_with_deadline(settings.job_timeout, engine.summarize(request)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(JobFailure::Failed(format!("{label} returned an empty summary")));
        }

        Ok(Summary {
            text: text.to_string(),
            language,
            source: ProviderInfo::summarization(kind, model),
            created_at: Utc::now(),
        })
    }
}

/// Queues and runs summarization jobs.
#[derive(Clone)]
pub struct SummarizationOrchestrator {
    queue: TaskQueue,
    context: JobContext,
}

impl SummarizationOrchestrator {
    pub fn new(config: &CoreConfig, store: FileStatusStore, event_bus: EventBus) -> Result<Self> {
        let queue = TaskQueue::new(SUMMARIZATION_QUEUE, config.summarization.max_concurrent)?;
        forward_queue_stats(&queue, &event_bus);

        Ok(Self {
            queue,
            context: JobContext {
                store,
                engines: config.summarization_engines.clone().into(),
                secure_store: Arc::clone(&config.secure_store),
                settings: Arc::new(RwLock::new(config.summarization.clone())),
                event_bus,
            },
        })
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn settings(&self) -> SummarizationSettings {
        self.context.settings()
    }

    /// A provider is selected and registered.
    pub fn is_enabled(&self) -> bool {
        select_summarization_provider(&self.context.settings(), &self.context.engines).is_some()
    }

    /// Changes the summary language for jobs that start from now on.
    pub fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        let mut settings = self
            .context
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        settings.language = if language.is_empty() {
            "auto".to_string()
        } else {
            language
        };
    }

    /// Transcribed, has text, no summary yet, and no summary attempt that is
    /// running, finished or failed.
    pub fn is_eligible(&self, file: &FileEntry) -> bool {
        file.status == FileStatus::Completed
            && file.transcript.as_ref().is_some_and(|t| !t.is_empty())
            && file.summary.is_none()
            && !matches!(
                file.summary_status,
                Some(SummaryStatus::Summarizing | SummaryStatus::Completed | SummaryStatus::Error)
            )
            && !self.queue.has(&file.path)
    }

    pub fn eligible_files<'a>(&self, tree: &'a FolderEntry) -> Vec<&'a FileEntry> {
        list_all_files(tree)
            .into_iter()
            .filter(|file| self.is_eligible(file))
            .collect()
    }

    /// Queues every eligible file. Does nothing while no provider is
    /// configured, so disabled summarization leaves files untouched.
    pub fn dispatch(&self, tree: &FolderEntry) -> Result<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let mut queued = 0;
        for file in self.eligible_files(tree) {
            if self.submit(&file.path)? {
                queued += 1;
            }
        }
        if queued > 0 {
            info!(count = queued, "Queued files for summarization");
        }
        Ok(queued)
    }

    /// Queues one file regardless of its summary status. Returns `false`
    /// when it is already pending or running.
    pub fn submit(&self, path: &str) -> Result<bool> {
        if self.queue.is_active(path) {
            return Ok(false);
        }
        self.queue.reset_item(path);

        let context = JobContext {
            store: self.context.store.session(),
            ..self.context.clone()
        };
        let owned = path.to_string();
        let queued = self
            .queue
            .enqueue(path, task(move || context.run(owned)))?;
        if queued {
            debug!(file = %strip_path(path), "Queued for summarization");
        }
        Ok(queued)
    }

    pub fn cancel(&self, path: &str) -> bool {
        self.queue.dequeue(path)
    }
}

impl std::fmt::Debug for SummarizationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationOrchestrator")
            .field("queue", &self.queue)
            .field("engines", &self.context.engines.len())
            .finish()
    }
}
