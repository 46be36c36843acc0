use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session not ready: {0}")]
    Configuration(String),

    #[error("Invalid argument: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Rejected by upload policy: {0}")]
    Policy(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Timed out waiting for completion of file {file_id}")]
    CompletionTimeout { file_id: String },

    #[error("Upload cancelled while waiting for file {file_id}")]
    Cancelled { file_id: String },

    #[error("File {file_id} is already awaiting completion")]
    DuplicateCompletion { file_id: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn configuration(message: &str) -> Self {
        Self::Configuration(message.to_string())
    }

    pub fn invalid_argument(field: &str, message: &str) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    pub fn server(code: i64, message: &str) -> Self {
        Self::Server {
            code,
            message: message.to_string(),
        }
    }

    pub fn crypto(message: &str) -> Self {
        Self::Crypto(message.to_string())
    }

    /// Errors that will fail again with the same inputs and session.
    ///
    /// Nothing in this crate retries; callers use this to decide whether a
    /// failed call is worth repeating. A failed call may still have left
    /// accepted chunks on the server.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_)
                | AppError::InvalidArgument { .. }
                | AppError::NotFound { .. }
                | AppError::Policy(_)
                | AppError::Crypto(_)
                | AppError::Validation { .. }
                | AppError::Config(_)
        )
    }

    /// The server file id a correlation error refers to, if any.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            AppError::CompletionTimeout { file_id }
            | AppError::Cancelled { file_id }
            | AppError::DuplicateCompletion { file_id } => Some(file_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(AppError::configuration("Secret key is not available").is_permanent());
        assert!(AppError::invalid_argument("file_paths", "Missing filePaths").is_permanent());
        assert!(AppError::Policy("File extension \"exe\" is not allowed".into()).is_permanent());
        assert!(!AppError::server(-1, "busy").is_permanent());
        assert!(!AppError::CompletionTimeout {
            file_id: "1".into()
        }
        .is_permanent());
    }

    #[test]
    fn test_file_id_accessor() {
        let err = AppError::Cancelled {
            file_id: "12345".into(),
        };
        assert_eq!(err.file_id(), Some("12345"));
        assert_eq!(AppError::crypto("boom").file_id(), None);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AppError::server(114, "Tham số không hợp lệ").to_string(),
            "Server error 114: Tham số không hợp lệ"
        );
        assert_eq!(
            AppError::not_found("/tmp/a.png").to_string(),
            "File not found: /tmp/a.png"
        );
    }
}
