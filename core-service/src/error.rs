use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("{0}")]
    Runtime(core_runtime::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] core_queue::QueueError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] core_pipeline::PipelineError),

    #[error("Could not read {root}: {message}")]
    Scan { root: String, message: String },

    #[error("No directory is open")]
    NoDirectory,

    #[error("File not found in the open directory: {0}")]
    FileNotFound(String),

    #[error("Cannot {action} {path}: {reason}")]
    NotEligible {
        action: &'static str,
        path: String,
        reason: String,
    },
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::Runtime(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
