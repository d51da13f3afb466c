//! Multipart request decoding.

use axum::extract::Multipart;
use weedout_pipeline::{RawForm, UploadedDataset};

use crate::error::ApiError;

/// Name of the multipart part carrying the dataset.
pub const FILE_FIELD: &str = "file";

/// A decoded upload request: the dataset plus every text field.
pub struct UploadForm {
    pub dataset: UploadedDataset,
    pub fields: RawForm,
}

/// Split a multipart body into the `file` part and the remaining text fields.
///
/// A body without a `file` part is rejected with "No file part". An empty
/// filename is left for staging to reject.
pub async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut dataset = None;
    let mut fields = RawForm::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            dataset = Some(UploadedDataset::new(file_name, bytes.to_vec()));
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let dataset = dataset.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    Ok(UploadForm { dataset, fields })
}
