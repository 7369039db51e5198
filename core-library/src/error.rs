use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// A status change that would break a record invariant.
    #[error("Invalid status change for {path}: {message}")]
    InvalidTransition { path: String, message: String },

    /// Write through a handle whose directory session has ended.
    #[error("Status session ended, dropping write for {path}")]
    SessionEnded { path: String },
}

impl LibraryError {
    /// The write belonged to a closed or replaced directory session.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::SessionEnded { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
