use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Concurrency ceiling for queue '{queue}' must be at least 1")]
    InvalidCeiling { queue: String },

    #[error("Queue '{queue}' can only start work from inside an async runtime")]
    NoRuntime { queue: String },
}

pub type Result<T> = std::result::Result<T, QueueError>;
