use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppResult;
use crate::file_processor::{compute_checksum, ClassifiedFile, FileCategory, FileMetadata};

use super::completion_registry::CompletionPush;
use super::control_events::id_to_string;

/// The `data` object of a successful chunk response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    #[serde(default)]
    pub photo_id: Option<Value>,
    #[serde(default)]
    pub file_id: Option<Value>,
    #[serde(default)]
    pub normal_url: Option<String>,
    #[serde(default)]
    pub hd_url: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub client_file_id: Option<Value>,
    #[serde(default)]
    pub chunk_id: Option<Value>,
    #[serde(default)]
    pub finished: Option<Value>,
}

fn as_integer(value: &Option<Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn is_sentinel(id: &Option<Value>) -> bool {
    match id {
        Some(Value::Number(n)) => n.as_i64() == Some(-1),
        Some(Value::String(s)) => s == "-1",
        _ => false,
    }
}

impl ChunkAck {
    /// `None` when the response carried no data at all.
    pub fn from_data(data: Value) -> AppResult<Option<Self>> {
        if data.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(data)?))
    }

    /// The id the server assigned once the whole file arrived, or `None`
    /// for an intermediate chunk (`-1`) or a response that names no id.
    pub fn final_id(&self, category: FileCategory) -> Option<String> {
        if is_sentinel(&self.file_id) || is_sentinel(&self.photo_id) {
            return None;
        }
        let id = match category {
            FileCategory::Image => self.photo_id.as_ref(),
            FileCategory::Video | FileCategory::Others => self.file_id.as_ref(),
        };
        id.and_then(id_to_string)
    }

    fn client_file_id(&self) -> Option<String> {
        self.client_file_id.as_ref().and_then(id_to_string)
    }

    fn chunk_id(&self) -> Option<u64> {
        as_integer(&self.chunk_id).and_then(|id| u64::try_from(id).ok())
    }

    fn finished(&self) -> Option<i64> {
        as_integer(&self.finished)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadResult {
    pub photo_id: String,
    pub normal_url: Option<String>,
    pub hd_url: Option<String>,
    pub thumb_url: Option<String>,
    pub client_file_id: Option<String>,
    pub chunk_id: Option<u64>,
    pub finished: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub total_size: u64,
    pub hd_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResult {
    pub file_id: String,
    pub file_url: String,
    pub checksum: String,
    pub total_size: u64,
    pub file_name: String,
    pub client_file_id: Option<String>,
    pub chunk_id: Option<u64>,
    pub finished: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "fileType", rename_all = "lowercase")]
pub enum UploadResult {
    Image(ImageUploadResult),
    Video(FileUploadResult),
    Others(FileUploadResult),
}

impl UploadResult {
    pub fn category(&self) -> FileCategory {
        match self {
            UploadResult::Image(_) => FileCategory::Image,
            UploadResult::Video(_) => FileCategory::Video,
            UploadResult::Others(_) => FileCategory::Others,
        }
    }

    /// Photo id for images, file id otherwise.
    pub fn server_id(&self) -> &str {
        match self {
            UploadResult::Image(image) => &image.photo_id,
            UploadResult::Video(file) | UploadResult::Others(file) => &file.file_id,
        }
    }
}

/// Images are finished by the HTTP response itself.
pub fn image_result(ack: &ChunkAck, photo_id: String, metadata: &FileMetadata) -> UploadResult {
    let (width, height) = metadata.dimensions.unwrap_or_default();
    UploadResult::Image(ImageUploadResult {
        photo_id,
        normal_url: ack.normal_url.clone(),
        hd_url: ack.hd_url.clone(),
        thumb_url: ack.thumb_url.clone(),
        client_file_id: ack.client_file_id(),
        chunk_id: ack.chunk_id(),
        finished: ack.finished(),
        width,
        height,
        total_size: metadata.total_size,
        hd_size: metadata.total_size,
    })
}

/// Merge the HTTP ack, the real-time push and the local metadata of a
/// video or other file, hashing the whole original file for `checksum`.
pub async fn file_result(
    file: &ClassifiedFile,
    ack: &ChunkAck,
    push: CompletionPush,
) -> AppResult<UploadResult> {
    let checksum = compute_checksum(&file.file_path).await?;

    let result = FileUploadResult {
        file_id: push.file_id,
        file_url: push.file_url,
        checksum,
        total_size: file.metadata.total_size,
        file_name: file.metadata.file_name.clone(),
        client_file_id: ack.client_file_id(),
        chunk_id: ack.chunk_id(),
        finished: ack.finished(),
    };

    Ok(match file.category {
        FileCategory::Video => UploadResult::Video(result),
        _ => UploadResult::Others(result),
    })
}
