use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{multipart, Body, Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::context::SessionContext;
use crate::crypto::decode_aes;
use crate::errors::{AppError, AppResult};
use crate::file_processor::FileCategory;

use super::upload_queue::ThreadType;

const WEB_ORIGIN: &str = "https://chat.zalo.me";
const CHUNK_FIELD: &str = "chunkContent";
const CHUNK_MIME: &str = "application/octet-stream";

/// One chunk on its way to the server.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub url: Url,
    pub file_name: String,
    pub chunk_id: u64,
    pub content: Bytes,
}

/// Sends a chunk and returns the `data` object of a successful envelope.
///
/// Error envelopes and HTTP failures come back as `Err`.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn send_chunk(&self, request: ChunkRequest) -> AppResult<Value>;
}

/// `POST <service>/<message|group>/<endpoint>?zpw_ver=..&zpw_type=..&type=..&params=..`
pub fn build_upload_url(
    service_url: &str,
    thread_type: ThreadType,
    category: FileCategory,
    session: &SessionContext,
    encrypted_params: &str,
) -> AppResult<Url> {
    let base = format!(
        "{}/{}/{}",
        service_url.trim_end_matches('/'),
        thread_type.path_segment(),
        category.endpoint()
    );

    Url::parse_with_params(
        &base,
        &[
            ("zpw_ver", session.api_version.to_string()),
            ("zpw_type", session.api_type.to_string()),
            ("type", thread_type.type_code().to_string()),
            ("params", encrypted_params.to_string()),
        ],
    )
    .map_err(|e| AppError::configuration(&format!("Invalid file service URL {}: {}", base, e)))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data(self) -> AppResult<Value> {
        if self.error_code != 0 {
            return Err(AppError::Server {
                code: self.error_code,
                message: self.error_message.unwrap_or_default(),
            });
        }
        Ok(self.data)
    }
}

/// Unwrap `{error_code, error_message, data}`. When `data` is a string it
/// is an encrypted inner envelope of the same shape.
pub fn decode_envelope(body: &str, secret_key: &str) -> AppResult<Value> {
    let outer: Envelope = serde_json::from_str(body)?;
    match outer.into_data()? {
        Value::String(encrypted) => {
            let decrypted = decode_aes(secret_key, &encrypted)?;
            let inner: Envelope = serde_json::from_str(&decrypted)?;
            inner.into_data()
        }
        data => Ok(data),
    }
}

/// HTTP transport for the file service.
pub struct FileClient {
    client: Client,
    session: Arc<SessionContext>,
}

impl FileClient {
    pub fn new(session: Arc<SessionContext>, request_timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            session,
        })
    }
}

#[async_trait]
impl ChunkTransport for FileClient {
    async fn send_chunk(&self, request: ChunkRequest) -> AppResult<Value> {
        let content_length = request.content.len() as u64;
        let part = multipart::Part::stream_with_length(Body::from(request.content), content_length)
            .file_name(request.file_name.clone())
            .mime_str(CHUNK_MIME)?;
        let form = multipart::Form::new().part(CHUNK_FIELD, part);

        log::debug!(
            "Sending chunk {} of {} ({} bytes)",
            request.chunk_id,
            request.file_name,
            content_length
        );

        let response = self
            .client
            .post(request.url)
            .header(COOKIE, self.session.cookie()?)
            .header(USER_AGENT, self.session.user_agent()?)
            .header(ACCEPT_LANGUAGE, self.session.language())
            .header(ORIGIN, WEB_ORIGIN)
            .header(REFERER, format!("{}/", WEB_ORIGIN))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::warn!(
                "Chunk {} of {} rejected with HTTP {}",
                request.chunk_id,
                request.file_name,
                status
            );
            return Err(AppError::Server {
                code: i64::from(status.as_u16()),
                message: format!("Request failed with status code {}", status.as_u16()),
            });
        }

        log::debug!(
            "File service response (first 300 chars): {}",
            &body[..body.char_indices().nth(300).map_or(body.len(), |(i, _)| i)]
        );

        decode_envelope(&body, self.session.secret_key()?)
    }
}
