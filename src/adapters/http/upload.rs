use crate::application::{AssetUpload, IngestError, IngestPipeline, StagingArea};
use crate::domain::product::Product;
use crate::ports::{processor::WatermarkEngine, repository::ProductRepository, storage::ObjectStorage};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    BoxError, Json,
};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Multipart field carrying the JSON metadata.
const METADATA_FIELD: &str = "body";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub uuid: String,
    pub media_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub product: Product,
}

// Accepts one file field plus a JSON `body` field, then runs the ingest pipeline.
pub async fn upload_audio<W, S, R>(
    State(pipeline): State<Arc<IngestPipeline<W, S, R>>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, IngestError>
where
    W: WatermarkEngine,
    S: ObjectStorage,
    R: ProductRepository,
{
    let staging = StagingArea::create_in(&pipeline.config().staging_dir)?;
    let mut metadata: Option<UploadMetadata> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if let Some(name) = field.file_name().map(str::to_owned) {
            if file_name.is_some() {
                return Err(IngestError::Validation(
                    "Only one file may be uploaded".to_string(),
                ));
            }
            let path = staging.original_path(&name);
            debug!(path = %path.display(), "Staging upload");
            stream_to_file(&path, field).await?;
            file_name = Some(name);
        } else if field.name() == Some(METADATA_FIELD) {
            let text = field.text().await.map_err(bad_multipart)?;
            let parsed = serde_json::from_str(&text)
                .map_err(|e| IngestError::Validation(format!("Invalid body: {}", e)))?;
            metadata = Some(parsed);
        }
    }

    let file_name =
        file_name.ok_or_else(|| IngestError::Validation("Can not get file".to_string()))?;
    let metadata = metadata
        .ok_or_else(|| IngestError::Validation(format!("Missing `{}` field", METADATA_FIELD)))?;

    let product = pipeline
        .run(AssetUpload {
            uuid: metadata.uuid,
            media_type: metadata.media_type,
            file_name,
            staging,
        })
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        product,
    }))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> IngestError {
    IngestError::Validation(err.body_text())
}

// Save a `Stream` to a file
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> io::Result<()>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    tokio::io::copy(&mut body_reader, &mut file).await?;
    tokio::io::AsyncWriteExt::flush(&mut file).await?;

    Ok(())
}
