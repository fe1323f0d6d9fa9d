use std::path::Path;

use rusoto_core::Region;
use rusoto_s3::{HeadObjectRequest, PutObjectRequest, S3Client, StreamingBody, S3};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::logging::LogSink;
use crate::uploader::{FatalError, UploadError, Uploader};

/// Uploads archives with a single `PutObject` and confirms them with `HeadObject`.
pub struct S3Uploader {
    client: S3Client,
    sink: LogSink,
}

impl S3Uploader {
    /// Credentials come from the standard AWS provider chain.
    pub fn new(region: Region, sink: LogSink) -> S3Uploader {
        S3Uploader::with_client(S3Client::new(region), sink)
    }

    pub fn with_client(client: S3Client, sink: LogSink) -> S3Uploader {
        S3Uploader { client, sink }
    }

    async fn put_and_verify(
        &self,
        local_path: &Path,
        container: &str,
        remote_key: &str,
    ) -> Result<(), UploadError> {
        let local_read = |source: std::io::Error| UploadError::LocalRead {
            path: local_path.display().to_string(),
            source,
        };
        let file = File::open(local_path).await.map_err(local_read)?;
        let meta = file.metadata().await.map_err(local_read)?;

        // streamed in chunks, the archive is never held in memory
        let put_object_request = PutObjectRequest {
            bucket: container.to_string(),
            key: remote_key.to_string(),
            content_length: Some(meta.len() as i64),
            body: Some(StreamingBody::new(ReaderStream::new(file))),
            ..Default::default()
        };
        let output = self.client.put_object(put_object_request).await?;
        log_debug!(self.sink, "put_object ok: {:?}", output);

        self.verify(container, remote_key, meta.len()).await
    }

    async fn verify(
        &self,
        container: &str,
        remote_key: &str,
        expected: u64,
    ) -> Result<(), UploadError> {
        let head_object_request = HeadObjectRequest {
            bucket: container.to_string(),
            key: remote_key.to_string(),
            ..Default::default()
        };
        let head = self.client.head_object(head_object_request).await?;

        match head.content_length {
            Some(length) if length == expected as i64 => Ok(()),
            remote => Err(UploadError::Verification {
                local: expected,
                remote,
            }),
        }
    }
}

impl Uploader for S3Uploader {
    async fn upload(
        &self,
        local_path: &Path,
        container: &str,
        remote_key: &str,
    ) -> Result<bool, FatalError> {
        log_info!(
            self.sink,
            "uploading {} to {}/{}",
            local_path.display(),
            container,
            remote_key
        );

        match self.put_and_verify(local_path, container, remote_key).await {
            Ok(()) => {
                log_info!(self.sink, "uploaded {}/{}", container, remote_key);
                Ok(true)
            }
            Err(UploadError::Fatal(err)) => Err(err),
            Err(err) => {
                log_error!(
                    self.sink,
                    "upload of {} to {}/{} failed: {}",
                    local_path.display(),
                    container,
                    remote_key,
                    err
                );
                Ok(false)
            }
        }
    }
}
