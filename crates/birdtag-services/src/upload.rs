//! Presigned uploads
//!
//! The client uploads straight to object storage. The catalog record is
//! created when the URL is handed out, so later pipeline events find it.

use birdtag_core::{AppError, Config, FileType, MediaId, MediaRecord};
use birdtag_db::MediaCatalogStore;
use birdtag_storage::{ObjectLocation, ObjectStorage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::bounded::bounded;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub storage_key: String,
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub file_type: FileType,
}

#[derive(Clone)]
pub struct UploadService {
    storage: Arc<dyn ObjectStorage>,
    catalog: Arc<dyn MediaCatalogStore>,
    upload_expiration: Duration,
    store_timeout: Duration,
    signing_timeout: Duration,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        catalog: Arc<dyn MediaCatalogStore>,
        config: &Config,
    ) -> Self {
        Self {
            storage,
            catalog,
            upload_expiration: Duration::from_secs(config.upload_url_expiration_secs),
            store_timeout: Duration::from_millis(config.store_call_timeout_ms),
            signing_timeout: Duration::from_millis(config.signing_timeout_ms),
        }
    }

    /// Presign a PUT for `file_name` and register the media item.
    ///
    /// The object key is `{folder}/{media_id}.{ext}` with the folder chosen by
    /// extension, so the media id can be recovered from the key later.
    #[tracing::instrument(skip(self, content_type))]
    pub async fn create_upload(
        &self,
        file_name: &str,
        content_type: &str,
        uploader: &str,
    ) -> Result<PresignedUpload, AppError> {
        let file_type = FileType::from_file_name(file_name).ok_or_else(|| {
            AppError::InvalidInput(format!("Unsupported file type: '{}'", file_name))
        })?;
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        let media_id = MediaId::generate();
        let storage_key = format!("{}/{}.{}", file_type.storage_folder(), media_id, extension);
        let location = ObjectLocation::new(self.storage.default_bucket(), storage_key.clone());

        let upload_url = bounded(
            "storage.presigned_put_url",
            self.signing_timeout,
            async {
                self.storage
                    .presigned_put_url(&location, content_type, self.upload_expiration)
                    .await
                    .map_err(AppError::from)
            },
        )
        .await?;

        let record = MediaRecord::new(
            media_id.clone(),
            file_type,
            self.storage.object_url(&location),
            uploader,
        );
        bounded("catalog.put", self.store_timeout, self.catalog.put(&record)).await?;

        tracing::info!(media_id = %media_id, key = %storage_key, "Upload URL issued");
        Ok(PresignedUpload {
            upload_url,
            storage_key,
            media_id,
            file_type,
        })
    }
}
