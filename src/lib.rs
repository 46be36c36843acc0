//! Chunked attachment uploads for the zpw web messaging API.
//!
//! Files are validated against the server's share-file policy, split into
//! chunks, and posted with AES-encrypted parameters. Images finish with
//! the HTTP response; videos and other files finish when the real-time
//! channel pushes a `file_done` control for their file id, which the
//! listener feeds into the uploader's [`CompletionRegistry`].

pub mod config;
pub mod context;
pub mod crypto;
pub mod errors;
pub mod file_processor;
pub mod security;
pub mod uploader;

pub use context::{SessionContext, SharefileSettings};
pub use errors::{AppError, AppResult};
pub use uploader::{AttachmentUploader, CompletionPush, CompletionRegistry, ThreadType, UploadResult};
