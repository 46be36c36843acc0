// Attachment upload pipeline: chunk planning, dispatch to the file service,
// and correlation of asynchronous completions pushed over the real-time
// channel.

pub mod chunk_planner;
pub mod completion_registry;
pub mod control_events;
pub mod correlator;
pub mod file_client;
pub mod upload_queue;

pub use completion_registry::{CompletionPush, CompletionRegistry};
pub use control_events::dispatch_control_event;
pub use correlator::UploadResult;
pub use upload_queue::{AttachmentUploader, ThreadType};
