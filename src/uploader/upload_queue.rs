use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{validate_config, UploaderConfig};
use crate::context::SessionContext;
use crate::errors::AppResult;
use crate::file_processor::{classify_file, ClassifiedFile};
use crate::security::InputValidator;

use super::chunk_planner::{build_params, plan_task, ClientIdGenerator, UploadTask};
use super::completion_registry::CompletionRegistry;
use super::correlator::{file_result, image_result, ChunkAck, UploadResult};
use super::file_client::{build_upload_url, ChunkRequest, ChunkTransport, FileClient};

/// Conversation kind the attachment is uploaded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadType {
    #[default]
    Direct,
    Group,
}

impl ThreadType {
    pub fn path_segment(&self) -> &'static str {
        match self {
            ThreadType::Direct => "message",
            ThreadType::Group => "group",
        }
    }

    pub fn type_code(&self) -> u8 {
        match self {
            ThreadType::Direct => 2,
            ThreadType::Group => 11,
        }
    }
}

#[derive(Debug)]
struct IndexedResult {
    file_index: usize,
    result: UploadResult,
}

/// Uploads attachments for one logged-in session.
///
/// Owns the completion registry its asynchronous uploads wait on; hand
/// [`AttachmentUploader::registry`] to the real-time listener so it can
/// resolve `file_done` pushes.
pub struct AttachmentUploader {
    session: Arc<SessionContext>,
    config: UploaderConfig,
    transport: Arc<dyn ChunkTransport>,
    registry: Arc<CompletionRegistry>,
    client_ids: ClientIdGenerator,
}

impl AttachmentUploader {
    pub fn new(session: Arc<SessionContext>, config: UploaderConfig) -> AppResult<Self> {
        validate_config(&config)?;
        let transport = FileClient::new(Arc::clone(&session), config.request_timeout())?;
        Ok(Self::with_transport(
            session,
            config,
            Arc::new(transport),
            Arc::new(CompletionRegistry::new()),
        ))
    }

    pub fn with_transport(
        session: Arc<SessionContext>,
        config: UploaderConfig,
        transport: Arc<dyn ChunkTransport>,
        registry: Arc<CompletionRegistry>,
    ) -> Self {
        Self {
            session,
            config,
            transport,
            registry,
            client_ids: ClientIdGenerator::new(),
        }
    }

    pub fn registry(&self) -> Arc<CompletionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Upload `file_paths` to a conversation and return one result per
    /// finished file, in the order they finished.
    ///
    /// Fails as a whole if any chunk fails; chunks the server already
    /// accepted are left there.
    pub async fn upload_attachment(
        &self,
        file_paths: &[String],
        thread_id: &str,
        thread_type: ThreadType,
    ) -> AppResult<Vec<UploadResult>> {
        self.upload_attachment_with_cancel(
            file_paths,
            thread_id,
            thread_type,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`upload_attachment`](Self::upload_attachment), but waits for
    /// completion pushes only until `cancel` fires.
    pub async fn upload_attachment_with_cancel(
        &self,
        file_paths: &[String],
        thread_id: &str,
        thread_type: ThreadType,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<UploadResult>> {
        let results = self.run(file_paths, thread_id, thread_type, cancel).await?;
        Ok(results.into_iter().map(|r| r.result).collect())
    }

    /// Results grouped by input file order instead of completion order.
    pub async fn upload_attachment_ordered(
        &self,
        file_paths: &[String],
        thread_id: &str,
        thread_type: ThreadType,
    ) -> AppResult<Vec<UploadResult>> {
        let mut results = self
            .run(file_paths, thread_id, thread_type, &CancellationToken::new())
            .await?;
        results.sort_by_key(|r| r.file_index);
        Ok(results.into_iter().map(|r| r.result).collect())
    }

    async fn run(
        &self,
        file_paths: &[String],
        thread_id: &str,
        thread_type: ThreadType,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<IndexedResult>> {
        InputValidator::validate_session(&self.session)?;
        let settings = self.session.sharefile()?;
        InputValidator::validate_upload_request(settings, file_paths, thread_id)?;

        let secret_key = self.session.secret_key()?;
        let imei = self.session.imei()?;
        let service_url = self.session.file_service_url()?;
        let chunk_size = settings.chunk_size_file;

        // Every file must pass the policy checks before anything is sent.
        let classified = file_paths
            .iter()
            .map(|path| classify_file(path, settings))
            .collect::<AppResult<Vec<_>>>()?;

        let mut tasks: Vec<UploadTask> = Vec::with_capacity(classified.len());
        for file in classified {
            let params = build_params(
                &file,
                thread_id,
                thread_type,
                self.client_ids.next_id(),
                imei,
                chunk_size,
            );
            tasks.push(plan_task(file, params, chunk_size).await?);
        }

        log::info!(
            "Uploading {} file(s) to {:?} thread {}",
            tasks.len(),
            thread_type,
            thread_id
        );

        let mut units = Vec::new();
        for (file_index, mut task) in tasks.into_iter().enumerate() {
            let prepared = task.prepare_chunks(secret_key)?;
            let file = Arc::new(task.file);

            for chunk in prepared {
                let url = build_upload_url(
                    service_url,
                    thread_type,
                    file.category,
                    &self.session,
                    &chunk.encrypted_params,
                )?;
                let request = ChunkRequest {
                    url,
                    file_name: file.metadata.file_name.clone(),
                    chunk_id: chunk.chunk_id,
                    content: chunk.content,
                };
                units.push(self.dispatch_chunk(file_index, Arc::clone(&file), request, cancel));
            }
        }

        let limit = self
            .config
            .max_concurrent_requests
            .unwrap_or(units.len())
            .max(1);
        log::debug!("Dispatching {} chunk(s), at most {} at once", units.len(), limit);

        let mut in_flight = stream::iter(units).buffer_unordered(limit);
        let mut results = Vec::new();
        while let Some(finished) = in_flight.try_next().await? {
            if let Some(result) = finished {
                results.push(result);
            }
        }

        log::info!(
            "Upload to thread {} finished with {} result(s)",
            thread_id,
            results.len()
        );
        Ok(results)
    }

    async fn dispatch_chunk(
        &self,
        file_index: usize,
        file: Arc<ClassifiedFile>,
        request: ChunkRequest,
        cancel: &CancellationToken,
    ) -> AppResult<Option<IndexedResult>> {
        let chunk_id = request.chunk_id;
        let data = self.transport.send_chunk(request).await?;

        let Some(ack) = ChunkAck::from_data(data)? else {
            return Ok(None);
        };
        let Some(server_id) = ack.final_id(file.category) else {
            log::debug!(
                "Chunk {} of {} acknowledged",
                chunk_id,
                file.metadata.file_name
            );
            return Ok(None);
        };

        if !file.category.completes_asynchronously() {
            log::info!(
                "Image {} uploaded as photo {}",
                file.metadata.file_name,
                server_id
            );
            return Ok(Some(IndexedResult {
                file_index,
                result: image_result(&ack, server_id, &file.metadata),
            }));
        }

        // Register before yielding so the push cannot slip past us.
        let pending = self.registry.register(&server_id)?;
        let push = pending
            .wait(self.config.completion_timeout(), cancel)
            .await?;

        log::info!(
            "{} finished processing as file {}",
            file.metadata.file_name,
            server_id
        );
        Ok(Some(IndexedResult {
            file_index,
            result: file_result(&file, &ack, push).await?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_type_wire_values() {
        assert_eq!(ThreadType::Direct.path_segment(), "message");
        assert_eq!(ThreadType::Group.path_segment(), "group");
        assert_eq!(ThreadType::Direct.type_code(), 2);
        assert_eq!(ThreadType::Group.type_code(), 11);
        assert_eq!(ThreadType::default(), ThreadType::Direct);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = UploaderConfig::default();
        config.max_concurrent_requests = Some(0);
        assert!(AttachmentUploader::new(Arc::new(SessionContext::new()), config).is_err());
    }
}
