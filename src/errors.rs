use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid backup target `{name}`: {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("Dump of database `{database}` failed ({status}): {stderr}")]
    Dump {
        database: String,
        status: String,
        stderr: String,
    },

    #[error("Upload of `{key}` failed: {message}")]
    Upload {
        key: String,
        message: String,
        /// Raw protocol-level response, when the client kept one.
        diagnostic: Option<String>,
    },

    #[error("Listing objects under `{prefix}` failed: {message}")]
    List { prefix: String, message: String },

    #[error("Deleting `{key}` failed: {message}")]
    Delete { key: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
