// src/upload.rs - HTTP document upload, the alternative to inline set-document
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use url::Url;

use crate::ingest::IngestError;

/// Multipart field the controller reads the document from.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No upload endpoint configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upload rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// POST `document` to `url` as multipart form data under [`UPLOAD_FIELD`].
pub async fn upload_document(
    client: &reqwest::Client,
    url: Url,
    file_name: &str,
    document: String,
) -> Result<(), UploadError> {
    tracing::info!("Uploading '{}' ({} bytes) to {}", file_name, document.len(), url);
    let part = Part::text(document).file_name(file_name.to_string());
    let form = Form::new().part(UPLOAD_FIELD, part);
    let response = client.post(url).multipart(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Upload rejected: HTTP {} {}", status, body);
        return Err(UploadError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}
