use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::crypto::encode_aes;
use crate::errors::AppResult;
use crate::file_processor::ClassifiedFile;

use super::upload_queue::ThreadType;

/// Hands out `clientId`s: wall-clock milliseconds, bumped so that no two
/// files uploaded through the same generator ever share one.
#[derive(Debug, Default)]
pub struct ClientIdGenerator {
    last: AtomicI64,
}

impl ClientIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Per-file parameters sent, encrypted, with every chunk. Field order is
/// the order the web client serializes them in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,
    pub total_chunk: u64,
    pub file_name: String,
    pub client_id: i64,
    pub total_size: u64,
    pub imei: String,
    #[serde(rename = "isE2EE")]
    pub is_e2ee: u8,
    pub jxl: u8,
    pub chunk_id: u64,
}

/// One file ready for dispatch.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file: ClassifiedFile,
    pub params: UploadParams,
    pub chunks: Vec<Bytes>,
}

/// A chunk whose parameters are already fixed and encrypted.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub chunk_id: u64,
    pub encrypted_params: String,
    pub content: Bytes,
}

pub fn chunk_count(total_size: u64, chunk_size: u64) -> u64 {
    total_size.div_ceil(chunk_size)
}

/// Split `content` into `chunk_size` pieces without copying. Only the last
/// piece may be shorter.
pub fn split_chunks(content: Bytes, chunk_size: u64) -> Vec<Bytes> {
    let chunk_size = chunk_size as usize;
    let total = content.len();
    (0..total)
        .step_by(chunk_size)
        .map(|start| content.slice(start..(start + chunk_size).min(total)))
        .collect()
}

pub fn build_params(
    file: &ClassifiedFile,
    thread_id: &str,
    thread_type: ThreadType,
    client_id: i64,
    imei: &str,
    chunk_size: u64,
) -> UploadParams {
    let (toid, grid) = match thread_type {
        ThreadType::Direct => (Some(thread_id.to_string()), None),
        ThreadType::Group => (None, Some(thread_id.to_string())),
    };

    UploadParams {
        toid,
        grid,
        total_chunk: chunk_count(file.metadata.total_size, chunk_size),
        file_name: file.metadata.file_name.clone(),
        client_id,
        total_size: file.metadata.total_size,
        imei: imei.to_string(),
        is_e2ee: 0,
        jxl: 0,
        chunk_id: 1,
    }
}

pub async fn plan_task(
    file: ClassifiedFile,
    params: UploadParams,
    chunk_size: u64,
) -> AppResult<UploadTask> {
    let content = Bytes::from(tokio::fs::read(&file.file_path).await?);
    let chunks = split_chunks(content, chunk_size);

    if chunks.is_empty() {
        log::warn!(
            "{} is empty, nothing will be sent for it",
            file.metadata.file_name
        );
    }

    Ok(UploadTask {
        file,
        params,
        chunks,
    })
}

impl UploadTask {
    /// Encrypt the parameters for every chunk in order, advancing
    /// `chunkId` once per chunk.
    ///
    /// This runs to completion before any request is sent, so the server
    /// sees `1..=totalChunk` no matter how the requests finish.
    pub fn prepare_chunks(&mut self, secret_key: &str) -> AppResult<Vec<PreparedChunk>> {
        let mut prepared = Vec::with_capacity(self.chunks.len());
        for content in &self.chunks {
            let serialized = serde_json::to_string(&self.params)?;
            let encrypted_params = encode_aes(secret_key, &serialized)?;
            prepared.push(PreparedChunk {
                chunk_id: self.params.chunk_id,
                encrypted_params,
                content: content.clone(),
            });
            self.params.chunk_id += 1;
        }
        Ok(prepared)
    }
}
