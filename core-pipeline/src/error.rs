use core_library::LibraryError;
use core_queue::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
